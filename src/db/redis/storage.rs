use redis::AsyncCommands;
use redis::Client;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::db::session::{SessionKey, SessionStorage};
use crate::error::AppResult;

/// Creates a Redis client for session storage
///
/// Opening the client does not connect; the first command does.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous storage writes
#[derive(Debug)]
enum StorageCommand {
    Set { key: String, value: Vec<u8> },
    Remove { key: String },
}

/// Session storage persisted in Redis
///
/// Keys are namespaced by session id and expire after the session TTL.
/// Reads come from an in-process mirror loaded at connect time, so the
/// storage contract stays synchronous; writes go through a single
/// background writer and therefore reach Redis in issue order.
pub struct RedisStorage {
    session_id: Uuid,
    mirror: RwLock<HashMap<SessionKey, Vec<u8>>>,
    write_tx: mpsc::UnboundedSender<StorageCommand>,
}

/// Handle for gracefully shutting down the storage writer
pub struct StorageWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl StorageWriterHandle {
    /// Signals the writer and waits until queued writes are flushed
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Session writer shutdown signal sent");
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Session writer task join error");
        }
    }
}

impl RedisStorage {
    /// Loads the session's existing keys and starts the background writer
    pub async fn connect(
        redis_client: Client,
        session_id: Uuid,
        ttl: u64,
    ) -> AppResult<(Self, StorageWriterHandle)> {
        let mut conn = redis_client.get_multiplexed_async_connection().await?;

        let mut mirror = HashMap::new();
        for key in SessionKey::ALL {
            let stored: Option<Vec<u8>> = conn.get(Self::redis_key(session_id, key)).await?;
            if let Some(value) = stored {
                mirror.insert(key, value);
            }
        }

        tracing::info!(
            session_id = %session_id,
            restored_keys = mirror.len(),
            "Session storage connected"
        );

        let (storage, write_rx) = Self::with_mirror(session_id, mirror);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            Self::storage_writer_task(redis_client, ttl, write_rx, shutdown_rx).await;
        });

        Ok((storage, StorageWriterHandle { shutdown_tx, task }))
    }

    fn with_mirror(
        session_id: Uuid,
        mirror: HashMap<SessionKey, Vec<u8>>,
    ) -> (Self, mpsc::UnboundedReceiver<StorageCommand>) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let storage = Self {
            session_id,
            mirror: RwLock::new(mirror),
            write_tx,
        };
        (storage, write_rx)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    fn redis_key(session_id: Uuid, key: SessionKey) -> String {
        format!("session:{}:{}", session_id, key)
    }

    /// Background task that applies storage commands in order
    ///
    /// On shutdown signal, flushes all remaining commands before exiting.
    async fn storage_writer_task(
        client: Client,
        ttl: u64,
        mut write_rx: mpsc::UnboundedReceiver<StorageCommand>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Session writer task started");

        loop {
            tokio::select! {
                msg = write_rx.recv() => {
                    let Some(msg) = msg else { break };
                    if let Err(e) = Self::apply(&client, ttl, msg).await {
                        tracing::error!(error = %e, "Failed to write session key to Redis");
                    }
                }
                _ = shutdown_rx.recv() => {
                    write_rx.close();
                    while let Some(msg) = write_rx.recv().await {
                        if let Err(e) = Self::apply(&client, ttl, msg).await {
                            tracing::error!(error = %e, "Failed to flush session write during shutdown");
                        }
                    }
                    break;
                }
            }
        }

        tracing::info!("Session writer task stopped");
    }

    async fn apply(client: &Client, ttl: u64, msg: StorageCommand) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        match msg {
            StorageCommand::Set { key, value } => {
                let _: () = conn.set_ex(key, value, ttl).await?;
            }
            StorageCommand::Remove { key } => {
                let _: () = conn.del(key).await?;
            }
        }
        Ok(())
    }

    fn enqueue(&self, msg: StorageCommand) {
        if let Err(e) = self.write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to queue session write");
        }
    }
}

impl SessionStorage for RedisStorage {
    fn get(&self, key: SessionKey) -> Option<Vec<u8>> {
        self.mirror
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    fn set(&self, key: SessionKey, value: Vec<u8>) {
        self.mirror
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.clone());
        self.enqueue(StorageCommand::Set {
            key: Self::redis_key(self.session_id, key),
            value,
        });
    }

    fn remove(&self, key: SessionKey) {
        self.mirror
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        self.enqueue(StorageCommand::Remove {
            key: Self::redis_key(self.session_id, key),
        });
    }
}

// Tests below never open a connection; the writer queue is inspected directly.

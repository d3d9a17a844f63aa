use serde::Serialize;
use std::fmt::Display;

/// One asynchronous operation lane with its own generation tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    Popular,
    Search,
    Liked,
    Recommend,
    Detail,
}

impl Pipeline {
    pub const ALL: [Pipeline; 5] = [
        Pipeline::Popular,
        Pipeline::Search,
        Pipeline::Liked,
        Pipeline::Recommend,
        Pipeline::Detail,
    ];

    fn index(self) -> usize {
        match self {
            Pipeline::Popular => 0,
            Pipeline::Search => 1,
            Pipeline::Liked => 2,
            Pipeline::Recommend => 3,
            Pipeline::Detail => 4,
        }
    }
}

impl Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Pipeline::Popular => "popular",
            Pipeline::Search => "search",
            Pipeline::Liked => "liked",
            Pipeline::Recommend => "recommend",
            Pipeline::Detail => "detail",
        };
        write!(f, "{}", name)
    }
}

/// Status of the current generation of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    #[default]
    Idle,
    Pending,
    Applied,
    Failed,
}

/// How a finished operation was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Result merged into state
    Applied,
    /// Superseded before completion; result dropped without any mutation
    Discarded,
    /// Network call failed while still current; error surfaced
    Failed,
}

/// Generation captured when an operation is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pipeline: Pipeline,
    generation: u64,
}

impl Ticket {
    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Per-pipeline generation counters
///
/// A result may be applied only while the ticket it was issued with is
/// still current. Issuing a new operation or invalidating the pipeline
/// advances the counter and thereby supersedes every outstanding ticket.
#[derive(Debug, Default)]
pub struct Generations {
    counters: [u64; 5],
}

impl Generations {
    pub fn issue(&mut self, pipeline: Pipeline) -> Ticket {
        let counter = &mut self.counters[pipeline.index()];
        *counter += 1;
        Ticket {
            pipeline,
            generation: *counter,
        }
    }

    pub fn invalidate(&mut self, pipeline: Pipeline) {
        self.counters[pipeline.index()] += 1;
    }

    pub fn invalidate_all(&mut self) {
        for pipeline in Pipeline::ALL {
            self.invalidate(pipeline);
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.counters[ticket.pipeline.index()] == ticket.generation
    }
}

/// Status of every pipeline, as exposed in the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStatuses([PipelineStatus; 5]);

impl PipelineStatuses {
    pub fn get(&self, pipeline: Pipeline) -> PipelineStatus {
        self.0[pipeline.index()]
    }

    pub(crate) fn set(&mut self, pipeline: Pipeline, status: PipelineStatus) {
        self.0[pipeline.index()] = status;
    }
}

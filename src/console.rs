/// Line-oriented presentation layer
///
/// Parses user commands into intents for the core and renders snapshots as
/// plain text.
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{
    error::{AppError, AppResult},
    models::{Movie, MovieId},
    orchestrator::{SessionCore, Snapshot, Tab},
    services::CatalogApi,
};

pub const HELP: &str = "\
commands:
  search <text>   search by title (debounced); empty text clears
  clear           clear the search
  like <id>       like / unlike a movie
  tab <name>      discover | liked | recs
  open <id>       show movie details
  close           close the details
  topk <n>        number of recommendations (1-50)
  recommend       request recommendations
  reset           clear the session
  show            print the current view
  genres          list genres
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search(String),
    Clear,
    Like(MovieId),
    Tab(Tab),
    Open(MovieId),
    Close,
    TopK(i64),
    Recommend,
    Reset,
    Show,
    Genres,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = AppError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_lowercase().as_str() {
            "search" | "s" => Command::Search(rest.to_string()),
            "clear" => Command::Clear,
            "like" | "l" => Command::Like(parse_number(word, rest)?),
            "tab" | "t" => Command::Tab(rest.parse()?),
            "open" | "o" => Command::Open(parse_number(word, rest)?),
            "close" => Command::Close,
            "topk" => Command::TopK(parse_number(word, rest)?),
            "recommend" | "r" => Command::Recommend,
            "reset" => Command::Reset,
            "show" | "" => Command::Show,
            "genres" => Command::Genres,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => {
                return Err(AppError::InvalidInput(format!(
                    "Unknown command: {} (try 'help')",
                    other
                )))
            }
        };
        Ok(command)
    }
}

fn parse_number(command: &str, arg: &str) -> AppResult<i64> {
    arg.parse()
        .map_err(|_| AppError::InvalidInput(format!("{} expects a number, got {:?}", command, arg)))
}

fn render_movie(out: &mut String, movie: &Movie, liked: bool) {
    let marker = if liked { "♥" } else { " " };
    let _ = write!(out, "  {} {}", marker, movie);
    if let Some(rating) = movie.rating() {
        let _ = write!(out, "  ★ {:.2}", rating);
    }
    if let Some(genres) = movie.genres() {
        let _ = write!(out, "  {}", genres);
    }
    out.push('\n');
}

/// Renders the active view of a snapshot
pub fn render(snapshot: &Snapshot) -> String {
    let mut out = String::new();

    let _ = write!(
        out,
        "[{}] liked: {} | top-k: {}",
        snapshot.tab,
        snapshot.liked.len(),
        snapshot.top_k
    );
    if let Some(pipeline) = snapshot.loading {
        let _ = write!(out, " | loading {}…", pipeline);
    }
    out.push('\n');

    if let Some(error) = &snapshot.error {
        let _ = writeln!(out, "! {}", error.message);
    }

    let (list, empty_text) = match snapshot.tab {
        Tab::Discover if !snapshot.search_query.trim().is_empty() => (
            snapshot.discover_list(),
            format!("No search results for \"{}\".", snapshot.search_query),
        ),
        Tab::Discover => (snapshot.discover_list(), "No popular movies.".to_string()),
        Tab::Liked if snapshot.liked.is_empty() => {
            (&[][..], "You haven't liked any movies yet.".to_string())
        }
        Tab::Liked => (&snapshot.liked_movies[..], "Loading liked movies…".to_string()),
        Tab::Recommendations => (
            &snapshot.recommendations[..],
            "No recommendations yet. Like a few movies and run 'recommend'.".to_string(),
        ),
    };

    if list.is_empty() {
        let _ = writeln!(out, "  {}", empty_text);
    }
    for movie in list {
        render_movie(&mut out, movie, snapshot.is_liked(movie.movie_id));
    }

    if let Some(movie_id) = snapshot.detail_id {
        match &snapshot.detail {
            Some(movie) => {
                let _ = writeln!(out, "── {}", movie);
                let _ = writeln!(out, "   Genres: {}", movie.genres().unwrap_or("-"));
                if let Some(rating) = movie.rating() {
                    let _ = writeln!(out, "   Rating mean: {:.2}", rating);
                }
                if let Some(poster) = movie.poster() {
                    let _ = writeln!(out, "   Poster: {}", poster);
                }
                if let Some(overview) = movie.overview.as_deref().filter(|o| !o.is_empty()) {
                    let _ = writeln!(out, "   {}", overview);
                }
            }
            None => {
                let _ = writeln!(out, "── Movie #{} (loading…)", movie_id);
            }
        }
    }

    out
}

/// Prints the view whenever an operation settles or a new error appears
pub fn spawn_change_printer(mut rx: watch::Receiver<Snapshot>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = rx.borrow_and_update().clone();

        while rx.changed().await.is_ok() {
            let current = rx.borrow_and_update().clone();

            let settled = last.loading.is_some() && current.loading.is_none();
            let new_error = current.error.is_some() && current.error != last.error;

            if settled || new_error {
                println!("{}", render(&current));
            }
            last = current;
        }
    })
}

/// Reads commands until `quit` or end of input
pub async fn run<R>(core: &SessionCore, catalog: Arc<dyn CatalogApi>, input: R) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    println!("{}", HELP);

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read input: {}", e)))?
    {
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                println!("! {}", e);
                continue;
            }
        };

        match command {
            Command::Search(text) => core.set_search_query(text),
            Command::Clear => core.clear_search(),
            Command::Like(movie_id) => {
                let liked = core.toggle_like(movie_id);
                println!("{} #{}", if liked { "Liked" } else { "Unliked" }, movie_id);
            }
            Command::Tab(tab) => {
                core.select_tab(tab);
                println!("{}", render(&core.snapshot()));
            }
            Command::Open(movie_id) => {
                core.open_detail(movie_id);
            }
            Command::Close => core.close_detail(),
            Command::TopK(k) => println!("top-k: {}", core.set_top_k(k)),
            Command::Recommend => {
                if let Err(e) = core.recommend() {
                    tracing::debug!(error = %e, "Recommend rejected");
                }
            }
            Command::Reset => {
                core.reset_session();
                println!("{}", render(&core.snapshot()));
            }
            Command::Show => println!("{}", render(&core.snapshot())),
            Command::Genres => match catalog.fetch_genres().await {
                Ok(genres) => {
                    let names: Vec<_> = genres.iter().filter_map(|g| g.name()).collect();
                    println!("{}", names.join(", "));
                }
                Err(e) => println!("! {}", e),
            },
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
        }
    }

    Ok(())
}

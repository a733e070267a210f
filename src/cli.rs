use std::cmp;
use std::error::Error;
use std::path::PathBuf;

use atty::Stream;
use clap::{Parser, Subcommand};
use lesson_gloss::config::AppConfig;
use lesson_gloss::practice::PracticeSession;
use lesson_gloss::{Highlighted, Lesson, VocabularyEntry};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lesson-gloss", about = "Read a lesson with highlighted vocabulary", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to ./lesson-gloss.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Lesson document to load, overriding the config file.
    #[arg(long, global = true)]
    lesson: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the lesson text with vocabulary highlighted.
    Highlight,
    /// Print the lesson translation.
    Translation,
    /// Operations on the lesson vocabulary.
    #[command(subcommand)]
    Vocab(VocabCommand),
    /// Run a simulated pronunciation attempt for one entry.
    Practice {
        /// Vocabulary entry ID.
        id: u32,
    },
    /// Serve the lesson over HTTP.
    #[cfg(feature = "web")]
    Serve {
        /// Address to bind, e.g. 127.0.0.1:8080.
        #[arg(long)]
        addr: Option<std::net::SocketAddr>,
        /// Page theme: tailwind or bootstrap.
        #[arg(long, value_parser = parse_theme)]
        theme: Option<lesson_gloss::config::WebTheme>,
        /// Public base URL used for canonical links.
        #[arg(long)]
        base_url: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum VocabCommand {
    /// List every entry.
    List,
    /// Show the definition and examples for an entry.
    Show {
        /// Word or entry ID to display.
        query: String,
        /// Interpret the query as an entry ID instead of a word.
        #[arg(long)]
        by_id: bool,
    },
    /// Search for entries whose word contains the provided substring.
    Search {
        /// Substring to match anywhere within the word.
        pattern: String,
        /// Maximum number of matches to return.
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[cfg(feature = "web")]
fn parse_theme(value: &str) -> Result<lesson_gloss::config::WebTheme, String> {
    use lesson_gloss::config::WebTheme;
    match value.to_ascii_lowercase().as_str() {
        "tailwind" => Ok(WebTheme::Tailwind),
        "bootstrap" => Ok(WebTheme::Bootstrap),
        other => Err(format!("unknown theme {other:?} (expected tailwind or bootstrap)")),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lesson_gloss=info,tower_http=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = AppConfig::discover(cli.config.as_deref())?;
    if let Some(lesson) = cli.lesson {
        config.lesson = lesson;
    }

    match cli.command {
        #[cfg(feature = "web")]
        Command::Serve {
            addr,
            theme,
            base_url,
        } => {
            if let Some(addr) = addr {
                config.web.addr = addr;
            }
            if let Some(theme) = theme {
                config.web.theme = theme;
            }
            if let Some(base_url) = base_url {
                config.web.base_url = base_url;
            }
            handle_serve(config)
        }
        Command::Highlight => handle_highlight(&load_lesson(&config)?, cli.json),
        Command::Translation => handle_translation(&load_lesson(&config)?, cli.json),
        Command::Vocab(VocabCommand::List) => handle_list(&load_lesson(&config)?, cli.json),
        Command::Vocab(VocabCommand::Show { query, by_id }) => {
            handle_show(&load_lesson(&config)?, query, by_id, cli.json)
        }
        Command::Vocab(VocabCommand::Search { pattern, limit }) => {
            handle_search(&load_lesson(&config)?, pattern, limit, cli.json)
        }
        Command::Practice { id } => handle_practice(&load_lesson(&config)?, id, cli.json),
    }
}

fn load_lesson(config: &AppConfig) -> Result<Lesson, Box<dyn Error>> {
    Lesson::load(&config.lesson)
        .inspect_err(|err| {
            error!(path = %config.lesson.display(), %err, "Error loading lesson");
        })
        .map_err(Into::into)
}

#[cfg(feature = "web")]
fn handle_serve(config: AppConfig) -> Result<(), Box<dyn Error>> {
    use lesson_gloss::web::{WebConfig, serve};
    let web_config = WebConfig::new(config.lesson, &config.web);
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(web_config))?;
    Ok(())
}

fn handle_highlight(lesson: &Lesson, as_json: bool) -> Result<(), Box<dyn Error>> {
    let highlighted = lesson.highlighted();
    if as_json {
        let payload = json!({
            "title": lesson.title(),
            "segments": highlighted.segments(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        if let Some(title) = lesson.title() {
            println!("{title}\n");
        }
        println!("{}", render_highlighted(&highlighted, stdout_is_tty()));
    }
    Ok(())
}

fn handle_translation(lesson: &Lesson, as_json: bool) -> Result<(), Box<dyn Error>> {
    let translation = lesson.translation();
    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "translation": translation }))?
        );
    } else {
        match translation {
            Some(text) => println!("{text}"),
            None => println!("This lesson has no translation."),
        }
    }
    Ok(())
}

fn handle_list(lesson: &Lesson, as_json: bool) -> Result<(), Box<dyn Error>> {
    let entries = lesson.vocabulary().entries();
    if as_json {
        println!("{}", serde_json::to_string_pretty(entries)?);
    } else {
        print_entry_table(entries);
    }
    Ok(())
}

fn handle_show(
    lesson: &Lesson,
    query: String,
    by_id: bool,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let entry = if by_id {
        let id: u32 = query
            .trim()
            .parse()
            .map_err(|_| format!("Failed to parse entry ID from {query:?}"))?;
        lesson
            .entry(id)
            .ok_or_else(|| format!("No entry found for ID {id}"))?
    } else {
        lesson
            .vocabulary()
            .by_word(&query)
            .ok_or_else(|| format!("No entry found for word {query:?}"))?
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(entry)?);
    } else {
        print_entry(entry);
    }
    Ok(())
}

fn handle_search(
    lesson: &Lesson,
    pattern: String,
    limit: usize,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    if pattern.trim().is_empty() {
        return Err("Search pattern cannot be empty".into());
    }
    let limit = cmp::max(1, limit);
    let matches = lesson.vocabulary().search_contains(&pattern, limit);

    if as_json {
        let payload = json!({
            "pattern": pattern,
            "limit": limit,
            "results": matches.iter().map(|entry| {
                json!({"word": entry.word, "id": entry.id})
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if matches.is_empty() {
        println!("No vocabulary contains \"{pattern}\".");
    } else {
        println!("Matches for substring \"{pattern}\":");
        let owned: Vec<VocabularyEntry> = matches.into_iter().cloned().collect();
        print_entry_table(&owned);
    }
    Ok(())
}

fn handle_practice(lesson: &Lesson, id: u32, as_json: bool) -> Result<(), Box<dyn Error>> {
    let mut session = PracticeSession::new();
    let entry = session
        .open_entry(lesson, id)
        .ok_or_else(|| format!("No entry found for ID {id}"))?;
    session.request_recording()?;
    // No capture device here; the attempt is granted and stopped immediately.
    session.microphone_granted()?;
    let score = session
        .stop_recording(&mut rand::thread_rng())
        .ok_or("Recording did not start")?;

    if as_json {
        let payload = json!({ "id": entry.id, "word": entry.word, "score": score });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Practice: {}", entry.word);
        println!("Pronunciation score: {score} / 100");
    }
    Ok(())
}

/// Plain text with highlights bold on a terminal, or `[word]{#id}` otherwise.
fn render_highlighted(highlighted: &Highlighted<'_>, styled: bool) -> String {
    let skin = markdown_skin();
    let mut out = String::new();
    for segment in highlighted.segments() {
        match segment.entry_id {
            Some(_) if styled => out.push_str(&skin.bold.apply_to(segment.text).to_string()),
            Some(id) => out.push_str(&format!("[{}]{{#{id}}}", segment.text)),
            None => out.push_str(segment.text),
        }
    }
    out
}

fn print_entry_table(entries: &[VocabularyEntry]) {
    if entries.is_empty() {
        println!("This lesson has no vocabulary.");
        return;
    }
    let width = entries
        .iter()
        .map(|entry| entry.word.chars().count())
        .max()
        .unwrap_or(4)
        .max("WORD".len());
    println!("{:<5}  {:<width$}  {}", "ID", "WORD", "DEFINITION", width = width);
    println!("{:-<5}  {:-<width$}  {}", "", "", "----------", width = width);
    for entry in entries {
        println!(
            "{:<5}  {:<width$}  {}",
            entry.id,
            entry.word,
            entry.definition,
            width = width
        );
    }
}

fn print_entry(entry: &VocabularyEntry) {
    println!("Word: {} (ID {})", entry.word, entry.id);
    render_markdown_block("Definition", &entry.definition);

    println!("\nExamples:");
    if entry.examples.is_empty() {
        println!("No examples available.");
        return;
    }
    for example in &entry.examples {
        println!("- {}", example.en);
        println!("  {}", example.ja);
    }
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn markdown_skin() -> MadSkin {
    MadSkin::default()
}

fn render_markdown_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("\n{title}:");
    if stdout_is_tty() {
        let skin = markdown_skin();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}

//! readwise: command-line reader for the readwise backend.
//!
//! Browses extracted books, runs and follows extraction and translation
//! jobs, edits source markdown, and generates chapter summaries and
//! narration.

mod logging;
mod player;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use readwise_client::{
    language_label, translate_label, translation_target, ApiClient, BatchOutcome, BatchRun,
    BookStore, ClientConfig, JobBackend, JobController, JobEvent, JobParams, JobPhase, JobSnapshot,
    Playlist, SourceDraft, SummaryPanel,
};
use readwise_core::{BatchEventType, BatchProgress, JobKind, JobProgress, Lang};

use crate::player::CommandPlayer;

const DEFAULT_PLAYER: &str = "mpv --no-video --really-quiet";
const PLAYBACK_TICK: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "readwise")]
#[command(author, version, about = "Reader client for the readwise backend")]
#[command(propagate_version = true)]
struct Cli {
    /// Backend origin (overrides READWISE_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Debug logging (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Extraction,
    Translation,
}

impl From<KindArg> for JobKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Extraction => JobKind::Extraction,
            KindArg::Translation => JobKind::Translation,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List books in the library
    Books,

    /// Show a book and its chapters
    Book {
        /// Book id
        id: String,

        /// List the chapters of a translation instead of the source
        #[arg(short, long)]
        lang: Option<Lang>,
    },

    /// Print a chapter (the first one by default)
    Read {
        /// Book id
        id: String,

        /// Chapter file name
        chapter: Option<String>,

        /// Read a translation instead of the source
        #[arg(short, long)]
        lang: Option<Lang>,
    },

    /// Extract chapters from the book's PDF and follow progress
    Extract {
        /// Book id
        id: String,
    },

    /// Translate the book and follow progress
    Translate {
        /// Book id
        id: String,

        /// Target language (default: first language without a translation)
        #[arg(short, long)]
        to: Option<Lang>,

        /// Translation model (default: the backend's default model)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Show the server-side status of a job
    Status {
        /// Book id
        id: String,

        #[arg(short, long, value_enum, default_value = "extraction")]
        kind: KindArg,

        /// Keep following a running job until it settles
        #[arg(short, long)]
        follow: bool,
    },

    /// Ask the backend to cancel a job
    Cancel {
        /// Book id
        id: String,

        #[arg(short, long, value_enum, default_value = "extraction")]
        kind: KindArg,
    },

    /// Show available languages and translation progress
    Languages {
        /// Book id
        id: String,
    },

    /// List translation models
    Models,

    /// Show or replace the extracted source markdown
    Source {
        #[command(subcommand)]
        command: SourceCommand,
    },

    /// Regenerate chapters from the saved source markdown
    Resplit {
        /// Book id
        id: String,
    },

    /// Chapter summaries and narration
    Summary {
        #[command(subcommand)]
        command: SummaryCommand,
    },

    /// Generate every missing summary and narration track of a language
    Batch {
        /// Book id
        id: String,

        #[arg(short, long, default_value = "en")]
        lang: Lang,

        /// Summary model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Play the narration tracks of a language in chapter order
    Play {
        /// Book id
        id: String,

        #[arg(short, long, default_value = "en")]
        lang: Lang,

        /// Player command; the track URL is appended
        #[arg(short, long, default_value = DEFAULT_PLAYER)]
        player: String,

        /// Index of the first track
        #[arg(long, default_value_t = 0)]
        from: usize,
    },
}

#[derive(Subcommand)]
enum SourceCommand {
    /// Print the source markdown
    Show {
        /// Book id
        id: String,
    },

    /// Replace the source markdown with a file's content
    Edit {
        /// Book id
        id: String,

        /// Markdown file to upload
        #[arg(short, long)]
        file: PathBuf,

        /// Re-split chapters after saving
        #[arg(long)]
        resplit: bool,
    },
}

#[derive(Subcommand)]
enum SummaryCommand {
    /// Print a chapter summary
    Show {
        /// Book id
        id: String,
        /// Chapter file name
        chapter: String,
        #[arg(short, long, default_value = "en")]
        lang: Lang,
    },

    /// Generate (or regenerate) a chapter summary
    Generate {
        /// Book id
        id: String,
        /// Chapter file name
        chapter: String,
        #[arg(short, long, default_value = "en")]
        lang: Lang,
        /// Summary model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Replace the voice script with a file's content
    Script {
        /// Book id
        id: String,
        /// Chapter file name
        chapter: String,
        #[arg(short, long, default_value = "en")]
        lang: Lang,
        /// Text file with the new voice script
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Synthesize the narration track
    Mp3 {
        /// Book id
        id: String,
        /// Chapter file name
        chapter: String,
        #[arg(short, long, default_value = "en")]
        lang: Lang,
        /// Download the track to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ClientConfig::from_env();
    if let Some(url) = cli.base_url {
        config = config.with_base_url(url);
    }
    let api = Arc::new(ApiClient::new(config)?);
    let store = BookStore::new(api.clone());

    match cli.command {
        Commands::Books => cmd_books(&store).await,
        Commands::Book { id, lang } => cmd_book(&api, &id, lang).await,
        Commands::Read { id, chapter, lang } => cmd_read(&store, &id, chapter, lang).await,
        Commands::Extract { id } => cmd_extract(&store, &id).await,
        Commands::Translate { id, to, model } => cmd_translate(&store, &id, to, model).await,
        Commands::Status { id, kind, follow } => cmd_status(&store, &id, kind.into(), follow).await,
        Commands::Cancel { id, kind } => {
            let kind = JobKind::from(kind);
            api.cancel_job(kind, &id).await?;
            println!("{} cancel requested for {}", kind.label(), id);
            Ok(())
        }
        Commands::Languages { id } => cmd_languages(&store, &id).await,
        Commands::Models => {
            let models = api.models().await?;
            for model in &models.models {
                let marker = if *model == models.default { " (default)" } else { "" };
                println!("{model}{marker}");
            }
            Ok(())
        }
        Commands::Source { command } => cmd_source(&api, command).await,
        Commands::Resplit { id } => {
            let result = api.resplit(&id).await?;
            println!("{} ({} chapters)", result.message, result.chapter_count);
            Ok(())
        }
        Commands::Summary { command } => cmd_summary(&api, command).await,
        Commands::Batch { id, lang, model } => cmd_batch(&api, &id, lang, model).await,
        Commands::Play {
            id,
            lang,
            player,
            from,
        } => cmd_play(&api, &id, lang, &player, from).await,
    }
}

// =============================================================================
// LIBRARY
// =============================================================================

async fn cmd_books(store: &BookStore) -> anyhow::Result<()> {
    store.load_books().await?;
    let state = store.state().await;
    if state.books.is_empty() {
        println!("No books");
    }
    for book in &state.books {
        let extracted = if book.has_chapters { "extracted" } else { "not extracted" };
        println!("{}\t{}\t{}", book.id, book.title, extracted);
    }
    Ok(())
}

async fn cmd_book(api: &ApiClient, id: &str, lang: Option<Lang>) -> anyhow::Result<()> {
    let book = api.get_book(id).await?;
    println!("{} ({})", book.title, book.id);
    if !book.description.is_empty() {
        println!("{}", book.description);
    }
    if !book.has_chapters {
        println!("Not extracted yet. Run `readwise extract {}`.", book.id);
        return Ok(());
    }

    let chapters = match lang {
        Some(lang) => api.lang_chapters(id, lang).await?,
        None => api.list_chapters(id).await?,
    };
    println!();
    for chapter in &chapters {
        println!("{:>3}  {}  ({})", chapter.order, chapter.display_name(), chapter.filename);
    }
    Ok(())
}

async fn cmd_read(
    store: &BookStore,
    id: &str,
    chapter: Option<String>,
    lang: Option<Lang>,
) -> anyhow::Result<()> {
    if let Some(lang) = lang {
        let api = store.api();
        let file = match chapter {
            Some(file) => file,
            None => api
                .lang_chapters(id, lang)
                .await?
                .into_iter()
                .next()
                .map(|c| c.filename)
                .with_context(|| format!("No {} chapters for {}", lang.label(), id))?,
        };
        println!("{}", api.lang_chapter_content(id, lang, &file).await?);
        return Ok(());
    }

    store.load_chapters(id).await?;
    if let Some(file) = chapter {
        store.load_chapter_content(id, &file).await?;
    }
    let state = store.state().await;
    match state.chapter_content {
        Some(content) => println!("{content}"),
        None => bail!("No chapters for {}", id),
    }
    Ok(())
}

async fn cmd_languages(store: &BookStore, id: &str) -> anyhow::Result<()> {
    let info = store.load_languages(id).await?;
    println!("Source: {}", info.source_lang.label());
    for lang in Lang::ALL {
        println!("  {}", language_label(&info, lang));
    }
    if let Some(label) = translate_label(&info) {
        println!("Next: {label}");
    }
    Ok(())
}

// =============================================================================
// JOBS
// =============================================================================

async fn cmd_extract(store: &BookStore, id: &str) -> anyhow::Result<()> {
    let job = store.job(id, JobKind::Extraction);
    let events = job.events();

    match job.attach().await {
        Ok(snapshot) if snapshot.running() => {
            println!("Extraction already running, following it");
        }
        Ok(snapshot) => {
            if snapshot.can_retry() {
                println!("Resuming extraction ({}%)", snapshot.percent());
            }
            job.start(JobParams::Extraction).await?;
        }
        Err(e) => {
            debug!(book_id = %id, error = %e, "No extraction status, starting");
            job.start(JobParams::Extraction).await?;
        }
    }

    let done = follow(&job, events).await?;
    finish(store, &done).await
}

async fn cmd_translate(
    store: &BookStore,
    id: &str,
    to: Option<Lang>,
    model: Option<String>,
) -> anyhow::Result<()> {
    let info = store.load_languages(id).await?;
    let target = match to.or_else(|| translation_target(&info)) {
        Some(lang) => lang,
        None => {
            println!("Every language is already translated");
            return Ok(());
        }
    };
    let model = match model {
        Some(model) => model,
        None => store.api().models().await?.default,
    };
    if to.is_none() {
        if let Some(label) = translate_label(&info) {
            println!("{label}");
        }
    }
    info!(book_id = %id, target = %target, model = %model, "Translating");

    let job = store.job(id, JobKind::Translation);
    let events = job.events();
    job.start(JobParams::translation(target, model)).await?;

    let done = follow(&job, events).await?;
    finish(store, &done).await
}

async fn cmd_status(
    store: &BookStore,
    id: &str,
    kind: JobKind,
    follow_job: bool,
) -> anyhow::Result<()> {
    let job = store.job(id, kind);
    let events = job.events();
    let snapshot = job.attach().await?;
    print_snapshot(&snapshot);

    if follow_job && snapshot.running() {
        let done = follow(&job, events).await?;
        print_snapshot(&done);
    }
    Ok(())
}

/// Print progress until the run ends. Ctrl-C cancels the job.
async fn follow(
    job: &JobController<ApiClient>,
    mut events: broadcast::Receiver<JobEvent>,
) -> anyhow::Result<JobSnapshot> {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(JobEvent::Started { kind, .. }) => println!("{} started", kind.label()),
                Ok(JobEvent::Progress { progress, .. }) => print_progress(&progress),
                Ok(
                    JobEvent::Completed { .. }
                    | JobEvent::Failed { .. }
                    | JobEvent::Cancelled { .. },
                ) => break,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Progress output fell behind");
                    if !job.snapshot().running() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                    continue;
                }
                eprintln!("Cancelling {}...", job.kind());
                if let Err(e) = job.cancel_and_wait().await {
                    debug!(error = %e, "Nothing to cancel");
                }
                break;
            }
        }
    }
    Ok(job.snapshot())
}

async fn finish(store: &BookStore, done: &JobSnapshot) -> anyhow::Result<()> {
    print_snapshot(done);
    match done.phase {
        JobPhase::Completed => {
            if done.kind == JobKind::Extraction {
                let chapters = store.api().list_chapters(&done.book_id).await?;
                println!("{} chapters", chapters.len());
            }
            Ok(())
        }
        JobPhase::Errored => bail!("{}", done.message()),
        _ => Ok(()),
    }
}

fn print_progress(progress: &JobProgress) {
    match progress.current_step.as_deref() {
        Some(step) => println!("[{:>3}%] {} ({})", progress.percent(), progress.message(), step),
        None => println!("[{:>3}%] {}", progress.percent(), progress.message()),
    }
}

fn print_snapshot(snapshot: &JobSnapshot) {
    let status = snapshot
        .latest
        .as_ref()
        .map(|p| p.status.to_string())
        .unwrap_or_else(|| "idle".to_string());
    println!(
        "{} {}: {:?} [{}] {}%",
        snapshot.kind.label(),
        snapshot.book_id,
        snapshot.phase,
        status,
        snapshot.percent()
    );
    if !snapshot.message().is_empty() {
        println!("  {}", snapshot.message());
    }
    if let Some(count) = snapshot.chapter_count {
        println!("  {count} chapters");
    }
}

// =============================================================================
// SOURCE
// =============================================================================

async fn cmd_source(api: &Arc<ApiClient>, command: SourceCommand) -> anyhow::Result<()> {
    match command {
        SourceCommand::Show { id } => {
            println!("{}", api.source_markdown(&id).await?);
        }
        SourceCommand::Edit { id, file, resplit } => {
            let content = read_file(&file)?;
            let mut draft = SourceDraft::load(api.clone(), id.as_str()).await?;
            draft.set_content(content);

            if !draft.has_changes() {
                println!("Source unchanged");
            }
            if resplit {
                let result = draft.save_and_resplit().await?;
                println!("{} ({} chapters)", result.message, result.chapter_count);
            } else {
                draft.save().await?;
                println!("Source saved. Run `readwise resplit {id}` to rebuild chapters.");
            }
        }
    }
    Ok(())
}

// =============================================================================
// SUMMARIES
// =============================================================================

fn panel(api: &Arc<ApiClient>, id: &str, lang: Lang, chapter: &str) -> SummaryPanel<CommandPlayer> {
    SummaryPanel::new(
        api.clone(),
        id,
        lang,
        chapter,
        CommandPlayer::new("mpv"),
    )
}

async fn cmd_summary(api: &Arc<ApiClient>, command: SummaryCommand) -> anyhow::Result<()> {
    match command {
        SummaryCommand::Show { id, chapter, lang } => {
            let mut panel = panel(api, &id, lang, &chapter);
            panel.load().await?;
            print_summary(&panel);
        }
        SummaryCommand::Generate {
            id,
            chapter,
            lang,
            model,
        } => {
            let mut panel = panel(api, &id, lang, &chapter);
            panel.generate(model.as_deref()).await?;
            print_summary(&panel);
        }
        SummaryCommand::Script {
            id,
            chapter,
            lang,
            file,
        } => {
            let script = read_file(&file)?;
            let mut panel = panel(api, &id, lang, &chapter);
            panel.load().await?;
            panel.edit_script(script)?;
            panel.save().await?;
            println!("Voice script saved");
        }
        SummaryCommand::Mp3 {
            id,
            chapter,
            lang,
            output,
        } => {
            let mut panel = panel(api, &id, lang, &chapter);
            panel.load().await?;
            panel.generate_mp3().await?;
            let Some(url) = panel.mp3_url() else {
                bail!("Narration was not generated for {}", chapter);
            };
            match output {
                Some(path) => {
                    let bytes = api.fetch_mp3(&id, lang, &chapter).await?;
                    std::fs::write(&path, &bytes)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Saved {} bytes to {}", bytes.len(), path.display());
                }
                None => println!("{url}"),
            }
        }
    }
    Ok(())
}

fn print_summary(panel: &SummaryPanel<CommandPlayer>) {
    let Some(summary) = panel.summary() else {
        println!("No summary for {}", panel.chapter());
        return;
    };
    if let Some(title) = &summary.chapter_title {
        println!("# {title}\n");
    }
    print_list("Key points", &summary.key_points);
    print_list("Conclusions", &summary.conclusions);
    print_list("Examples", &summary.examples);
    if !summary.voice_script.is_empty() {
        println!("Voice script:\n{}\n", summary.voice_script);
    }
    if let Some(at) = summary.generated_time() {
        let model = summary.model.as_deref().unwrap_or("unknown model");
        println!("Generated {} by {}", at.format("%Y-%m-%d %H:%M"), model);
    }
    if let Some(at) = summary.edited_time() {
        println!("Edited {}", at.format("%Y-%m-%d %H:%M"));
    }
    println!("Narration: {}", if panel.has_mp3() { "yes" } else { "no" });
}

fn print_list(heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{heading}:");
    for item in items {
        println!("  - {item}");
    }
    println!();
}

async fn cmd_batch(
    api: &Arc<ApiClient>,
    id: &str,
    lang: Lang,
    model: Option<String>,
) -> anyhow::Result<()> {
    let mut run = BatchRun::new(api.clone(), id, lang);
    let stopper = run.stopper();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Stopping batch...");
            stopper.stop();
        }
    });

    let outcome = run.run(model.as_deref(), print_batch_progress).await;
    interrupt.abort();

    match outcome? {
        BatchOutcome::Completed {
            generated_summaries,
            generated_mp3s,
        } => println!(
            "Generated {generated_summaries} summaries and {generated_mp3s} narration tracks"
        ),
        BatchOutcome::Stopped => println!("Stopped"),
        BatchOutcome::Interrupted => println!("Batch ended before completion"),
    }

    let state = run.state();
    for failure in &state.errors {
        println!(
            "  failed {}: {}",
            failure.chapter.as_deref().unwrap_or("?"),
            failure.message.as_deref().unwrap_or("unknown error")
        );
    }
    if let Some(status) = &state.status {
        println!(
            "{}/{} summaries, {}/{} narration tracks",
            status.with_summary, status.total, status.with_mp3, status.total
        );
    }
    Ok(())
}

fn print_batch_progress(frame: &BatchProgress) {
    match frame.kind {
        BatchEventType::Progress => println!(
            "[{:>3}%] {} {}",
            frame.percent(),
            frame.chapter.as_deref().unwrap_or(""),
            frame.step.map(|s| s.as_str()).unwrap_or("")
        ),
        BatchEventType::Error => eprintln!(
            "[{:>3}%] {} failed: {}",
            frame.percent(),
            frame.chapter.as_deref().unwrap_or(""),
            frame.message.as_deref().unwrap_or("")
        ),
        BatchEventType::Complete => {}
    }
}

// =============================================================================
// PLAYBACK
// =============================================================================

async fn cmd_play(
    api: &Arc<ApiClient>,
    id: &str,
    lang: Lang,
    player: &str,
    from: usize,
) -> anyhow::Result<()> {
    let mut run = BatchRun::new(api.clone(), id, lang);
    run.status().await?;
    let tracks = run.narration_tracks();
    if tracks.is_empty() {
        bail!("No narration tracks for {} ({})", id, lang.label());
    }

    let mut playlist = Playlist::new(CommandPlayer::from_command_line(player)?);
    playlist.set_tracks(tracks);
    playlist.play(from)?;

    let mut shown = None;
    loop {
        if playlist.position() != shown {
            shown = playlist.position();
            if let Some(i) = shown {
                let track = &playlist.tracks()[i];
                println!("[{}/{}] {}", i + 1, playlist.tracks().len(), track.chapter);
            }
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                playlist.stop();
                break;
            }
            _ = tokio::time::sleep(PLAYBACK_TICK) => {
                if !playlist.tick()? {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn read_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

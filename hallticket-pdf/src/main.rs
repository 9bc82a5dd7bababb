// hallticket-pdf: Generate exam hall tickets for a class

use clap::{Parser, Subcommand};
use hallticket_pdf::assembler::output_path;
use hallticket_pdf::{
    ApiClient, AppError, BatchOutcome, CancelToken, HallTicketService, Progress, ProgressSink,
    Session, Settings,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate exam hall tickets for a class")]
struct Args {
    /// Settings file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, env = "HALLTICKET_API", global = true)]
    api: Option<String>,

    /// Bearer token for the backend
    #[arg(long, env = "HALLTICKET_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Background template (file path or URL)
    #[arg(long, global = true)]
    background: Option<String>,

    /// TrueType font for ticket text
    #[arg(long, global = true)]
    font: Option<PathBuf>,

    /// Number of tickets rendered at once
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the classes known to the backend
    Classes,

    /// Generate one PDF with the hall tickets of every student in a class
    Download {
        /// Class id or class name
        #[arg(long)]
        class: String,

        /// Exam name printed on each ticket (defaults to the backend's)
        #[arg(short, long)]
        exam: Option<String>,

        /// Directory the PDF is written to
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Render a single ticket to check the template
    Preview {
        /// Class id or class name (defaults to the first class)
        #[arg(long)]
        class: Option<String>,

        /// Exam name printed on the ticket
        #[arg(short, long)]
        exam: Option<String>,

        /// Output JPEG file
        #[arg(short, long, default_value = "preview.jpg")]
        output: PathBuf,

        /// Also print the preview as a data URL
        #[arg(long)]
        data_url: bool,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let args = Args::parse();
    let settings = load_settings(&args)?;

    let session = match &args.token {
        Some(token) => Session::with_token(token.clone()),
        None => Session::anonymous(),
    };
    let api = ApiClient::new(&settings, session);
    let service = HallTicketService::new(Arc::new(api), settings)?;

    match args.command {
        Command::Classes => list_classes(&service),
        Command::Download { class, exam, output_dir } => {
            download(&service, &class, exam.as_deref(), output_dir)
        }
        Command::Preview { class, exam, output, data_url } => {
            preview(&service, class.as_deref(), exam.as_deref(), output, data_url)
        }
    }
}

fn load_settings(args: &Args) -> Result<Settings, AppError> {
    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(api) = &args.api {
        settings.api_base = api.clone();
    }
    if let Some(background) = &args.background {
        settings.background = Some(background.clone());
    }
    if let Some(font) = &args.font {
        settings.font = Some(font.clone());
    }
    if let Some(workers) = args.workers {
        settings.workers = workers;
    }
    settings.validate()?;
    Ok(settings)
}

// ============================================================================
// Commands
// ============================================================================

fn list_classes(service: &HallTicketService) -> Result<(), AppError> {
    let classes = service.classes()?;
    if classes.is_empty() {
        println!("No classes found.");
        return Ok(());
    }
    let id_width = classes.iter().map(|c| c.id.len()).max().unwrap_or(2).max(2);
    println!("{:<id_width$}  CLASS", "ID");
    for class in &classes {
        println!("{:<id_width$}  {}", class.id, class.class_name);
    }
    Ok(())
}

fn download(
    service: &HallTicketService,
    class_key: &str,
    exam: Option<&str>,
    output_dir: PathBuf,
) -> Result<(), AppError> {
    let class = service.resolve_class(class_key)?;
    let progress = ConsoleProgress::default();

    match service.download(&class, exam, &progress, &CancelToken::new())? {
        BatchOutcome::Empty { class } => {
            println!("ℹ No hall tickets found for {}", class.class_name);
        }
        BatchOutcome::Completed(batch) => {
            std::fs::create_dir_all(&output_dir)?;
            let path = output_path(&output_dir, &batch.class.class_name);
            batch.document.save(&path)?;

            println!("✓ Generated: {}", path.display());
            println!("  Class: {}", batch.class.class_name);
            if !batch.exam_name.is_empty() {
                println!("  Exam: {}", batch.exam_name);
            }
            println!("  Pages: {}", batch.document.page_count());
            println!("  Batch ID: {}", batch.batch_id);
        }
    }
    Ok(())
}

fn preview(
    service: &HallTicketService,
    class_key: Option<&str>,
    exam: Option<&str>,
    output: PathBuf,
    data_url: bool,
) -> Result<(), AppError> {
    let class = match class_key {
        Some(key) => service.resolve_class(key)?,
        None => service
            .classes()?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("no classes to preview".into()))?,
    };

    let Some(page) = service.render_preview(&class, exam, &CancelToken::new())? else {
        println!("ℹ No hall tickets found for {}", class.class_name);
        return Ok(());
    };
    std::fs::write(&output, &page.image_bytes)?;

    println!("✓ Preview: {}", output.display());
    println!("  Class: {}", class.class_name);
    println!("  Register No: {}", page.label);
    if data_url {
        println!("{}", page.data_url());
    }
    Ok(())
}

// ============================================================================
// Progress Bar
// ============================================================================

const BAR_WIDTH: usize = 30;

#[derive(Default)]
struct ConsoleProgress {
    last_percent: Mutex<Option<u32>>,
}

impl ProgressSink for ConsoleProgress {
    fn report(&self, progress: Progress) {
        let percent = progress.percent();
        let done = progress.completed == progress.total;
        let mut last = self.last_percent.lock().unwrap_or_else(|e| e.into_inner());
        if *last == Some(percent) && !done {
            return;
        }
        *last = Some(percent);

        let filled = (progress.fraction() * BAR_WIDTH as f64).round() as usize;
        let mut stderr = std::io::stderr().lock();
        let _ = write!(
            stderr,
            "\r  [{}{}] {:>3}% ({}/{})",
            "#".repeat(filled),
            ".".repeat(BAR_WIDTH - filled.min(BAR_WIDTH)),
            percent,
            progress.completed,
            progress.total
        );
        if done {
            let _ = writeln!(stderr);
        }
        let _ = stderr.flush();
    }

    fn reset(&self) {
        let mut last = self.last_percent.lock().unwrap_or_else(|e| e.into_inner());
        if last.take().is_some() {
            eprintln!();
        }
    }
}

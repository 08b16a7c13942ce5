mod app;
mod commands;
mod render;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use moneymate_lib::catalog::InstitutionType;

#[derive(Parser)]
#[command(name = "moneymate-cli", about = "MoneyMate document catalog CLI", version)]
struct Cli {
    /// Config file (default: <config dir>/moneymate/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the session token
    Login {
        email: String,
        /// Password (read from stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account
    Register {
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        /// Password (read from stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Clear the stored session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// List documents
    List {
        /// bank or electronic_money
        #[arg(long)]
        institution_type: Option<InstitutionType>,
        /// Only the well-known banks
        #[arg(long)]
        top_banks: bool,
        /// Document type; "Diğer" lists custom types
        #[arg(long)]
        doc_type: Option<String>,
        /// Case-insensitive text search
        #[arg(long)]
        search: Option<String>,
    },

    /// List known institution names
    Institutions,

    /// Show one document
    Show { id: String },

    /// Upload a new document
    Add {
        /// File to upload (max 10 MB)
        file: PathBuf,
        #[arg(long)]
        institution: String,
        #[arg(long, default_value = "bank")]
        institution_type: InstitutionType,
        #[arg(long)]
        doc_type: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// Edit a document; omitted fields keep their value
    Edit {
        id: String,
        /// Replace the stored file
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        institution: Option<String>,
        #[arg(long)]
        institution_type: Option<InstitutionType>,
        #[arg(long)]
        doc_type: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a document
    Delete { id: String },

    /// Save a document's file
    Download {
        id: String,
        /// Target directory (default: configured download dir)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Follow session changes made by other clients
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && std::io::stdout().is_terminal();
    let app = app::App::new(cli.config.as_deref(), cli.format, use_color)?;

    match cli.command {
        Command::Login { email, password } => {
            let password = resolve_password(password)?;
            commands::auth::login(&app, &email, &password).await?;
        }
        Command::Register {
            email,
            first_name,
            last_name,
            password,
        } => {
            let password = resolve_password(password)?;
            commands::auth::register(&app, email, first_name, last_name, password).await?;
        }
        Command::Logout => commands::auth::logout(&app)?,
        Command::Whoami => commands::auth::whoami(&app)?,
        Command::List {
            institution_type,
            top_banks,
            doc_type,
            search,
        } => {
            let filters = commands::documents::ListFilters {
                institution_type,
                top_banks,
                doc_type,
                search,
            };
            commands::documents::list(&app, filters).await?;
        }
        Command::Institutions => commands::documents::institutions(&app).await?,
        Command::Show { id } => commands::documents::show(&app, &id).await?,
        Command::Add {
            file,
            institution,
            institution_type,
            doc_type,
            title,
            description,
        } => {
            let edit = commands::documents::DocumentEdit {
                institution: Some(institution),
                institution_type: Some(institution_type),
                doc_type: Some(doc_type),
                title: Some(title),
                description,
            };
            commands::documents::add(&app, &file, edit).await?;
        }
        Command::Edit {
            id,
            file,
            institution,
            institution_type,
            doc_type,
            title,
            description,
        } => {
            let edit = commands::documents::DocumentEdit {
                institution,
                institution_type,
                doc_type,
                title,
                description,
            };
            commands::documents::edit(&app, &id, file.as_deref(), edit).await?;
        }
        Command::Delete { id } => commands::documents::delete(&app, &id).await?,
        Command::Download { id, out } => {
            commands::documents::download(&app, &id, out).await?;
        }
        Command::Watch => commands::watch::run(&app).await?,
    }

    Ok(())
}

/// Use the flag when given, otherwise read one line from stdin
fn resolve_password(password: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    if std::io::stdin().is_terminal() {
        eprint!("Password: ");
    }
    let mut buf = String::new();
    std::io::stdin().read_line(&mut buf)?;
    Ok(buf.trim_end_matches(&['\r', '\n'][..]).to_string())
}

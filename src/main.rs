use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use rusqlite::Connection;

use contract_registry::{
    bootstrap_admin, open_database, validate_cnpj, validate_cpf, Config, Entity, MaskKind,
    PermissionSet, Record, RegistryKind, RegistryService, Session, User,
};

#[derive(Debug, Parser)]
#[command(version, about = "Contract and registry management")]
struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (missing file means defaults)
    #[arg(short, long, default_value = "contract-registry.toml", global = true)]
    config: PathBuf,

    /// Database file, overriding the configured one
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Credentials for commands that act on the registry
#[derive(Debug, clap::Args)]
struct Auth {
    /// CPF of the acting user
    #[arg(long)]
    cpf: String,

    /// Password of the acting user
    #[arg(long)]
    password: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database and, optionally, the first administrator
    Init(Init),

    /// Manage users
    #[command(subcommand)]
    User(UserCommand),

    /// Manage entities
    #[command(subcommand)]
    Entity(EntityCommand),

    /// List a registry (entities, municipalities, contracts, ...)
    List {
        kind: String,
        /// Case-insensitive filter
        #[arg(short, long, default_value = "")]
        search: String,
        #[command(flatten)]
        auth: Auth,
    },

    /// Print a registry as CSV
    Print {
        kind: String,
        #[arg(short, long)]
        search: Option<String>,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        auth: Auth,
    },

    /// Report natural keys held by more than one stored record
    Duplicates {
        kind: String,
        #[command(flatten)]
        auth: Auth,
    },

    /// Record totals per registry
    Counts {
        #[command(flatten)]
        auth: Auth,
    },

    /// Change the acting user's password
    Passwd {
        #[command(flatten)]
        auth: Auth,
        #[arg(long)]
        new_password: String,
        #[arg(long)]
        confirm_password: String,
    },

    /// Check a CPF or CNPJ
    Check {
        /// "cpf" or "cnpj"
        kind: String,
        value: String,
    },

    /// Apply an input mask (cpf, cnpj, phone, date, cep)
    Mask { kind: String, value: String },
}

#[derive(Debug, clap::Args)]
struct Init {
    #[arg(long, requires_all = ["admin_cpf", "admin_dob", "admin_password"])]
    admin_name: Option<String>,
    #[arg(long)]
    admin_cpf: Option<String>,
    /// DD/MM/YYYY
    #[arg(long)]
    admin_dob: Option<String>,
    #[arg(long)]
    admin_password: Option<String>,
}

#[derive(Debug, Subcommand)]
enum UserCommand {
    /// Register a user
    Add {
        #[arg(long)]
        name: String,
        #[arg(long = "user-cpf")]
        user_cpf: String,
        /// DD/MM/YYYY
        #[arg(long)]
        dob: String,
        #[arg(long)]
        new_password: String,
        #[arg(long)]
        confirm_password: String,
        /// Comma-separated: all, view, create, edit, delete
        #[arg(long, value_delimiter = ',', default_value = "view")]
        permissions: Vec<String>,
        #[arg(long)]
        admin: bool,
        #[command(flatten)]
        auth: Auth,
    },
}

#[derive(Debug, Subcommand)]
enum EntityCommand {
    /// Register an entity
    Add {
        #[arg(long)]
        cnpj: String,
        #[arg(long)]
        name: String,
        #[arg(long = "type")]
        entity_type: String,
        #[arg(long)]
        street: String,
        #[arg(long)]
        number: String,
        #[arg(long)]
        district: String,
        #[arg(long)]
        city: String,
        #[arg(long)]
        cep: String,
        #[arg(long)]
        phone: String,
        #[arg(long, default_value = "")]
        complement: String,
        #[arg(long, default_value = "")]
        notes: String,
        #[command(flatten)]
        auth: Auth,
    },
}

fn setup_logging(verbosity: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn parse_kind(name: &str) -> Result<RegistryKind> {
    match RegistryKind::parse(name) {
        Some(kind) => Ok(kind),
        None => bail!(
            "unknown registry '{}' (expected one of: {})",
            name,
            RegistryKind::ALL
                .iter()
                .map(|k| k.table_name())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn login(conn: &Connection, auth: &Auth) -> Result<Session> {
    Ok(Session::login(conn, &auth.cpf, &auth.password)?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config)?;
    let db_path = cli.database.clone().unwrap_or_else(|| config.database_path.clone());

    match cli.command {
        Command::Check { kind, value } => {
            let valid = match kind.to_lowercase().as_str() {
                "cpf" => validate_cpf(&value),
                "cnpj" => validate_cnpj(&value),
                other => bail!("cannot check '{}' (expected cpf or cnpj)", other),
            };
            println!("{} {}", value, if valid { "✓ válido" } else { "✗ inválido" });
            if !valid {
                std::process::exit(1);
            }
        }

        Command::Mask { kind, value } => {
            let Some(mask) = MaskKind::parse(&kind) else {
                bail!("unknown mask '{}' (expected cpf, cnpj, phone, date or cep)", kind);
            };
            println!("{}", mask.apply(&value));
        }

        Command::Init(init) => {
            let conn = open_database(&db_path)?;
            println!("✓ Database ready: {}", db_path.display());

            if let (Some(name), Some(cpf), Some(dob), Some(password)) = (
                init.admin_name,
                init.admin_cpf,
                init.admin_dob,
                init.admin_password,
            ) {
                let admin = bootstrap_admin(&conn, User::new(&name, &cpf, &dob), &password, &password)?;
                println!("✓ Administrator created: {} ({})", admin.name, admin.cpf);
            }
        }

        Command::User(UserCommand::Add {
            name,
            user_cpf,
            dob,
            new_password,
            confirm_password,
            permissions,
            admin,
            auth,
        }) => {
            let conn = open_database(&db_path)?;
            let session = login(&conn, &auth)?;
            let registry = RegistryService::new(&conn, &session, &config.policy);

            let mut user = User::new(&name, &user_cpf, &dob)
                .with_permissions(PermissionSet::from_strings(permissions));
            if admin {
                user = user.admin();
            }
            let saved = registry.save_user(user, &new_password, &confirm_password)?;
            println!("✓ User saved: {} ({})", saved.name, saved.id());
        }

        Command::Entity(EntityCommand::Add {
            cnpj,
            name,
            entity_type,
            street,
            number,
            district,
            city,
            cep,
            phone,
            complement,
            notes,
            auth,
        }) => {
            let conn = open_database(&db_path)?;
            let session = login(&conn, &auth)?;
            let registry = RegistryService::new(&conn, &session, &config.policy);

            let mut entity = Entity::new(&cnpj, &name, &entity_type)
                .with_address(&street, &number, &district, &city, &cep)
                .with_phone(&phone);
            entity.complement = complement;
            entity.notes = notes;

            let saved = registry.create(entity)?;
            println!("✓ Entity saved: {} ({})", saved.corporate_name, saved.id());
        }

        Command::List { kind, search, auth } => {
            let kind = parse_kind(&kind)?;
            let conn = open_database(&db_path)?;
            let session = login(&conn, &auth)?;
            let registry = RegistryService::new(&conn, &session, &config.policy);

            let listing = registry.listing(kind, &search)?;
            println!("{}", listing.columns.join(" | "));
            for row in &listing.rows {
                println!("{}", row.join(" | "));
            }
            println!("\n{} record(s)", listing.rows.len());
        }

        Command::Print {
            kind,
            search,
            output,
            auth,
        } => {
            let kind = parse_kind(&kind)?;
            let conn = open_database(&db_path)?;
            let session = login(&conn, &auth)?;
            let registry = RegistryService::new(&conn, &session, &config.policy);

            let rows = match &output {
                Some(path) => {
                    let file = std::fs::File::create(path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    registry.print_kind(kind, file, search.as_deref())?
                }
                None => registry.print_kind(kind, std::io::stdout().lock(), search.as_deref())?,
            };
            if let Some(path) = output {
                println!("✓ {} row(s) written to {}", rows, path.display());
            }
        }

        Command::Duplicates { kind, auth } => {
            let kind = parse_kind(&kind)?;
            let conn = open_database(&db_path)?;
            let session = login(&conn, &auth)?;
            let registry = RegistryService::new(&conn, &session, &config.policy);

            let duplicates = registry.duplicates_of(kind)?;
            if duplicates.is_empty() {
                println!("✓ No duplicates in {}", kind.table_name());
            }
            for dup in duplicates {
                println!("⚠️  {}: {}", dup.key, dup.record_ids.join(", "));
            }
        }

        Command::Counts { auth } => {
            let conn = open_database(&db_path)?;
            let session = login(&conn, &auth)?;
            let registry = RegistryService::new(&conn, &session, &config.policy);

            for (kind, count) in registry.counts()? {
                println!("{:<20} {}", kind, count);
            }
        }

        Command::Passwd {
            auth,
            new_password,
            confirm_password,
        } => {
            let conn = open_database(&db_path)?;
            let session = login(&conn, &auth)?;
            session.change_password(&conn, &auth.password, &new_password, &confirm_password)?;
            println!("✓ Password changed");
        }
    }

    Ok(())
}

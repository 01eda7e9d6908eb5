use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use scim_bridge::config::AppConfig;
use scim_bridge::logging::init_logging;
use scim_bridge::parser::ResourceType;
use scim_bridge::{AppError, AppResult, Application, QueryParams};

#[derive(Parser, Debug)]
#[command(name = "scim-bridge")]
#[command(about = "SCIM views over flat user and group tables")]
struct Args {
    /// Configuration file path (default: config.yaml)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Context to operate on
    #[arg(long, default_value = "default")]
    context: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create missing tables and columns for every context
    Init,
    /// List resources as a SCIM ListResponse
    List {
        resource: ResourceArg,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        start_index: Option<i64>,
        #[arg(long)]
        count: Option<i64>,
        #[arg(long)]
        sort_by: Option<String>,
        #[arg(long)]
        sort_order: Option<String>,
        #[arg(long)]
        attributes: Option<String>,
        #[arg(long)]
        excluded_attributes: Option<String>,
    },
    /// Show one resource
    Get { resource: ResourceArg, id: String },
    /// Create a resource from a JSON payload
    Create {
        resource: ResourceArg,
        #[command(flatten)]
        input: PayloadInput,
    },
    /// Update a resource from a JSON payload
    Update {
        resource: ResourceArg,
        id: String,
        #[command(flatten)]
        input: PayloadInput,
    },
    /// Soft-delete a resource
    Delete { resource: ResourceArg, id: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ResourceArg {
    Users,
    Groups,
}

impl From<ResourceArg> for ResourceType {
    fn from(arg: ResourceArg) -> Self {
        match arg {
            ResourceArg::Users => ResourceType::User,
            ResourceArg::Groups => ResourceType::Group,
        }
    }
}

#[derive(clap::Args, Debug)]
struct PayloadInput {
    /// Inline JSON payload
    #[arg(long, conflicts_with = "file")]
    data: Option<String>,

    /// Read the payload from a file; stdin is used when neither is given
    #[arg(long)]
    file: Option<PathBuf>,
}

impl PayloadInput {
    fn read(&self) -> AppResult<Value> {
        let raw = match (&self.data, &self.file) {
            (Some(data), _) => data.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .map_err(|e| AppError::BadRequest(format!("Failed to read {}: {}", path.display(), e)))?,
            (None, None) => std::io::read_to_string(std::io::stdin())
                .map_err(|e| AppError::BadRequest(format!("Failed to read stdin: {}", e)))?,
        };
        Ok(serde_json::from_str(&raw)?)
    }
}

fn load_config(path: &Path) -> AppResult<AppConfig> {
    if path == Path::new("config.yaml") && !path.exists() {
        eprintln!("No config.yaml found, using default configuration (in-memory SQLite, context 'default')");
        return Ok(AppConfig::default_config());
    }
    AppConfig::load_from_file(path)
}

async fn run(args: Args) -> AppResult<Option<Value>> {
    let config = load_config(&args.config)?;
    init_logging(&config.logging)?;

    let app = Application::from_config(config).await?;
    let context = args.context.as_str();

    let output = match args.command {
        Command::Init => {
            let contexts: Vec<Value> = app
                .domains()
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "context": d.context,
                        "users": d.users.table(),
                        "groups": d.groups.table(),
                    })
                })
                .collect();
            Some(Value::Array(contexts))
        }
        Command::List {
            resource,
            filter,
            start_index,
            count,
            sort_by,
            sort_order,
            attributes,
            excluded_attributes,
        } => {
            let params = QueryParams {
                start_index,
                count,
                sort_by,
                sort_order,
                filter,
                attributes,
                excluded_attributes,
                ..Default::default()
            };
            let response = app.service(context, resource.into())?.list(&params).await?;
            Some(serde_json::to_value(response)?)
        }
        Command::Get { resource, id } => Some(app.service(context, resource.into())?.get(&id).await?),
        Command::Create { resource, input } => {
            let payload = input.read()?;
            Some(app.service(context, resource.into())?.create(payload).await?)
        }
        Command::Update { resource, id, input } => {
            let payload = input.read()?;
            Some(app.service(context, resource.into())?.update(&id, payload).await?)
        }
        Command::Delete { resource, id } => {
            app.service(context, resource.into())?.delete(&id).await?;
            None
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(Some(output)) => match serde_json::to_string_pretty(&output) {
            Ok(text) => {
                println!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        },
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.to_scim_error());
            ExitCode::FAILURE
        }
    }
}

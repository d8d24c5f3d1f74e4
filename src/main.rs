use anyhow::Result;
use clap::Parser;
use rgwiam::commands::{self, Operation, ResourceKind};
use rgwiam::context::Context;
use rgwiam::provider::{ConfigOverrides, Provider, ProviderConfig};
use std::path::PathBuf;
use std::time::Duration;

/// rgwiam - RadosGW IAM client
///
/// Manage OpenID Connect providers, roles and role policies on a Ceph
/// RadosGW gateway. Objects are described by JSON state files; results are
/// printed as JSON, or `null` when the object does not exist.
///
/// Examples:
///   rgwiam create role --file role.json --state state/role.json
///   rgwiam read role-policy --state state/policy.json
///   rgwiam import oidc-provider arn:aws:iam:::oidc-provider/accounts.example.com
#[derive(Parser, Debug)]
#[command(author, version = env!("RGWIAM_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RadosGW endpoint URL [env: RGW_ENDPOINT]
    #[arg(long, value_name = "URL", global = true)]
    endpoint: Option<String>,

    /// Access key of an account allowed to manage IAM objects [env: RGW_ACCESS_KEY]
    #[arg(long, value_name = "KEY", global = true)]
    access_key: Option<String>,

    /// Secret key matching the access key [env: RGW_SECRET_KEY]
    #[arg(long, value_name = "KEY", global = true)]
    secret_key: Option<String>,

    /// PEM bundle with additional trusted CA certificates [env: RGW_CA_FILE]
    #[arg(long, value_name = "PATH", global = true)]
    ca_file: Option<PathBuf>,

    /// Skip TLS certificate verification [env: RGW_INSECURE]
    #[arg(long, global = true)]
    insecure: bool,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    timeout: Option<u64>,

    /// Deadline for the whole operation in seconds, retries included
    #[arg(long, value_name = "SECS", global = true)]
    deadline: Option<u64>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Create an object from a JSON description
    Create(CreateArgs),

    /// Refresh a state file from the server
    Read(StateArgs),

    /// Bring an object in line with a new JSON description
    Update(UpdateArgs),

    /// Delete the object recorded in a state file
    Delete(StateArgs),

    /// Look up an existing object by id
    Import(ImportArgs),

    /// List existing objects
    List(ListArgs),
}

#[derive(clap::Args, Debug)]
struct CreateArgs {
    /// oidc-provider, role or role-policy
    kind: ResourceKind,

    /// JSON description of the object to create
    #[arg(long, short = 'f', value_name = "PATH")]
    file: PathBuf,

    /// Where to record the resulting state
    #[arg(long, short = 's', value_name = "PATH")]
    state: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct StateArgs {
    /// oidc-provider, role or role-policy
    kind: ResourceKind,

    /// State file written by a previous command
    #[arg(long, short = 's', value_name = "PATH")]
    state: PathBuf,
}

#[derive(clap::Args, Debug)]
struct UpdateArgs {
    /// oidc-provider, role or role-policy
    kind: ResourceKind,

    /// State file written by a previous command
    #[arg(long, short = 's', value_name = "PATH")]
    state: PathBuf,

    /// JSON description of the desired object
    #[arg(long, short = 'f', value_name = "PATH")]
    file: PathBuf,
}

#[derive(clap::Args, Debug)]
struct ImportArgs {
    /// oidc-provider, role or role-policy
    kind: ResourceKind,

    /// Provider ARN, role name, or ROLE:POLICY
    id: String,

    /// Where to record the imported state
    #[arg(long, short = 's', value_name = "PATH")]
    state: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct ListArgs {
    /// oidc-provider or role-policy
    kind: ResourceKind,

    /// Role whose policies to list
    #[arg(long, value_name = "NAME")]
    role: Option<String>,
}

impl Commands {
    fn into_parts(self) -> (ResourceKind, Operation) {
        match self {
            Commands::Create(args) => (
                args.kind,
                Operation::Create {
                    planned: args.file,
                    state: args.state,
                },
            ),
            Commands::Read(args) => (args.kind, Operation::Read { state: args.state }),
            Commands::Update(args) => (
                args.kind,
                Operation::Update {
                    state: args.state,
                    planned: args.file,
                },
            ),
            Commands::Delete(args) => (args.kind, Operation::Delete { state: args.state }),
            Commands::Import(args) => (
                args.kind,
                Operation::Import {
                    id: args.id,
                    state: args.state,
                },
            ),
            Commands::List(args) => (args.kind, Operation::List { role: args.role }),
        }
    }
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            endpoint: self.endpoint.clone(),
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            ca_file: self.ca_file.clone(),
            insecure: self.insecure,
            request_timeout: self.timeout.map(Duration::from_secs),
        }
    }

    fn context(&self) -> Context {
        match self.deadline {
            Some(secs) => Context::with_timeout(Duration::from_secs(secs)),
            None => Context::background(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = rgwiam::runtime::RealRuntime;

    let config = ProviderConfig::load(&runtime, &cli.overrides())?;
    let provider = Provider::configure(&runtime, config)?;
    let ctx = cli.context();
    let (kind, operation) = cli.command.into_parts();

    let output = commands::run(&runtime, &provider, &ctx, kind, &operation).await?;
    println!("{}", output);
    Ok(())
}

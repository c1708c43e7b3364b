mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use http::{HeaderName, HeaderValue, Method};
use tenant_dispatch::{Dispatcher, FileKeyValueStore, HyperTransport, SwappableHostContext};
use tenant_dispatch_sdk::{AuthToken, DispatchError, RequestDescriptor, Role, TenantSlug};

use crate::config::{AppConfig, CliOverrides};

/// Tenant dispatch - resolve tenants and send tenant-scoped API requests
#[derive(Parser)]
#[command(name = "tenant-dispatch")]
#[command(about = "Resolve tenants and send tenant-scoped API requests")]
#[command(version)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Origin to act from, e.g. `https://acme.example.com` (overrides config)
    #[arg(long)]
    origin: Option<String>,

    /// Current path within the origin (overrides config)
    #[arg(long)]
    path: Option<String>,

    /// Declared API origin (overrides config)
    #[arg(long)]
    api_origin: Option<String>,

    /// Credential file (overrides config)
    #[arg(long)]
    credentials_file: Option<PathBuf>,

    /// Print effective configuration (JSON) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tenant slug derived from the origin
    Host,
    /// Print the API origin requests are sent to
    Endpoint,
    /// Resolve a tenant slug (default: the current one) to its id
    Resolve { slug: Option<String> },
    /// Store a credential for the current tenant
    Login {
        #[arg(long, value_enum, default_value_t = RoleArg::Generic)]
        role: RoleArg,
        #[arg(long)]
        token: String,
        /// Tenant the credential belongs to (default: the current one)
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Remove every stored credential
    Logout,
    /// Print the current session state (default)
    Whoami,
    /// Dispatch a request through the full pipeline
    Request {
        method: String,
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
        /// Extra header, `Name: value`
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Generic,
    Buyer,
    Host,
    Staff,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Generic => Role::Generic,
            RoleArg::Buyer => Role::Buyer,
            RoleArg::Host => Role::Host,
            RoleArg::Staff => Role::Staff,
            RoleArg::Admin => Role::Admin,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json);

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_overrides(CliOverrides {
        origin: cli.origin,
        path: cli.path,
        api_origin: cli.api_origin,
        credentials_file: cli.credentials_file,
    });
    config
        .dispatch
        .validate()
        .context("invalid dispatch configuration")?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let dispatcher = build_dispatcher(&config)?;
    tracing::debug!(origin = %config.origin, path = %config.path, "Dispatcher ready");

    match cli.command.unwrap_or(Commands::Whoami) {
        Commands::Host => {
            match dispatcher.host().current_slug() {
                Some(slug) => println!("{slug}"),
                None => println!("(no tenant)"),
            }
            Ok(())
        }
        Commands::Endpoint => {
            println!("{}", dispatcher.endpoint().resolve()?);
            Ok(())
        }
        Commands::Resolve { slug } => resolve(&dispatcher, slug.as_deref()).await,
        Commands::Login {
            role,
            token,
            tenant,
        } => login(&dispatcher, role.into(), token, tenant.as_deref()),
        Commands::Logout => {
            dispatcher.credentials().clear_all()?;
            println!("Signed out");
            Ok(())
        }
        Commands::Whoami => {
            let state = dispatcher.credentials().session_state()?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(())
        }
        Commands::Request {
            method,
            path,
            body,
            headers,
        } => request(&dispatcher, &method, path, body.as_deref(), &headers).await,
    }
}

fn build_dispatcher(config: &AppConfig) -> Result<Dispatcher> {
    let location = Arc::new(SwappableHostContext::new(config.origin.clone()));
    location.set_path(config.path.clone());

    let credentials_path = config.credentials_path()?;
    let store = FileKeyValueStore::open(&credentials_path).with_context(|| {
        format!(
            "failed to open credential file {}",
            credentials_path.display()
        )
    })?;
    let transport =
        HyperTransport::new(&config.dispatch.transport).context("failed to build transport")?;

    Dispatcher::builder(config.dispatch.clone())
        .host_context(location)
        .store(Arc::new(store))
        .transport(Arc::new(transport))
        .build()
        .context("failed to build dispatcher")
}

fn slug_or_current(dispatcher: &Dispatcher, raw: Option<&str>) -> Result<Option<TenantSlug>> {
    match raw {
        Some(raw) => Ok(Some(TenantSlug::parse(&raw.to_ascii_lowercase())?)),
        None => Ok(dispatcher.host().current_slug()),
    }
}

async fn resolve(dispatcher: &Dispatcher, raw: Option<&str>) -> Result<()> {
    let slug = slug_or_current(dispatcher, raw)?
        .context("no tenant slug given and the origin does not name a tenant")?;
    match dispatcher.cache().resolve(&slug).await {
        Some(id) => {
            println!("{id}");
            Ok(())
        }
        None => anyhow::bail!("could not resolve tenant '{slug}'"),
    }
}

fn login(dispatcher: &Dispatcher, role: Role, token: String, tenant: Option<&str>) -> Result<()> {
    let tenant = slug_or_current(dispatcher, tenant)?;
    let token = AuthToken::new(token);
    dispatcher
        .credentials()
        .set_role_token(role, &token, tenant.as_ref())?;
    let state = dispatcher.credentials().session_state()?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

async fn request(
    dispatcher: &Dispatcher,
    method: &str,
    path: String,
    body: Option<&str>,
    headers: &[String],
) -> Result<()> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method '{method}'"))?;
    let mut descriptor = RequestDescriptor::new(method, path);
    for raw in headers {
        let (name, value) = raw
            .split_once(':')
            .with_context(|| format!("header '{raw}' is not 'Name: value'"))?;
        descriptor.headers.append(
            HeaderName::try_from(name.trim())?,
            HeaderValue::from_str(value.trim())?,
        );
    }
    if let Some(body) = body {
        let json: serde_json::Value =
            serde_json::from_str(body).context("request body is not valid JSON")?;
        descriptor = descriptor.with_json(&json)?;
    }

    match dispatcher.dispatch(descriptor).await {
        Ok(response) => {
            eprintln!("HTTP {}", response.status);
            println!("{}", String::from_utf8_lossy(&response.body));
            Ok(())
        }
        Err(DispatchError::Unauthorized { status, redirect }) => {
            println!("{}", serde_json::to_string_pretty(&redirect)?);
            anyhow::bail!(
                "request rejected with HTTP {status}; credentials cleared, sign in again at {}",
                redirect.location
            )
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_request_subcommand() {
        let cli = Cli::try_parse_from([
            "tenant-dispatch",
            "--origin",
            "https://acme.example.com",
            "request",
            "post",
            "/orders",
            "--body",
            r#"{"qty":1}"#,
            "-H",
            "x-request-id: r-1",
        ])
        .unwrap();
        assert_eq!(cli.origin.as_deref(), Some("https://acme.example.com"));
        let Some(Commands::Request {
            method, headers, ..
        }) = cli.command
        else {
            panic!("expected request subcommand");
        };
        assert_eq!(method, "post");
        assert_eq!(headers, vec!["x-request-id: r-1".to_owned()]);
    }

    #[test]
    fn login_role_defaults_to_generic() {
        let cli = Cli::try_parse_from(["tenant-dispatch", "login", "--token", "t"]).unwrap();
        let Some(Commands::Login { role, .. }) = cli.command else {
            panic!("expected login subcommand");
        };
        assert_eq!(Role::from(role), Role::Generic);
    }
}

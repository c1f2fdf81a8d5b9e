use std::{io::Write, net::SocketAddr, sync::Arc, time::Duration};

use clap::{Arg, ArgMatches, Command};
use stencil_common::{error::Error, state::BaseDbTrait};
use stencil_persistence_mem::InMemoryStateDb;
use stencil_registry::{
    GenerationContext, TemplateCatalog, TemplateGenerator, VersionLedger,
    config::{ConfigSource, FileConfigSource},
    server::GrpcWorkflowTemplateService,
};
use tonic::transport::Server;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_level(true)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config_arg = Arg::new("config")
        .short('c')
        .long("config")
        .help("Path to the configuration file")
        .default_value("./config.yaml")
        .action(clap::ArgAction::Set);

    let env_overrides_arg = Arg::new("env_overrides")
        .short('e')
        .long("env-overrides")
        .help("Override system config keys from the environment (and .env)")
        .action(clap::ArgAction::SetTrue);

    let matches = Command::new("stencil")
        .about("Stencil Workflow Template CLI")
        .version("0.1.0")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("serve")
                .about("Starts the Stencil Workflow Template Server")
                .arg(
                    Arg::new("listen_addr")
                        .short('l')
                        .long("listen_addr")
                        .help("Address to listen on")
                        .default_value("[::1]:50051")
                        .action(clap::ArgAction::Set),
                )
                .arg(config_arg.clone())
                .arg(
                    Arg::new("request_timeout_ms")
                        .short('t')
                        .long("request-timeout-ms")
                        .help("Upper bound for a single request, in milliseconds")
                        .value_parser(clap::value_parser!(u64))
                        .action(clap::ArgAction::Set),
                )
                .arg(env_overrides_arg.clone()),
        )
        .subcommand(
            Command::new("generate")
                .about("Generates a workflow template from a manifest")
                .arg(
                    Arg::new("manifest")
                        .short('m')
                        .long("manifest")
                        .help("Path to the workflow manifest")
                        .required(true)
                        .action(clap::ArgAction::Set),
                )
                .arg(config_arg.clone())
                .arg(
                    Arg::new("namespace")
                        .short('n')
                        .long("namespace")
                        .help("Namespace the template is generated for")
                        .default_value("default")
                        .action(clap::ArgAction::Set),
                )
                .arg(
                    Arg::new("name")
                        .long("name")
                        .help("Workflow name substituted into artifact keys")
                        .action(clap::ArgAction::Set),
                )
                .arg(
                    Arg::new("parameters")
                        .short('p')
                        .long("parameters")
                        .help("Print the resolved parameters instead of the manifest")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(env_overrides_arg.clone()),
        )
        .subcommand(
            Command::new("check-config")
                .about("Validates a configuration file")
                .arg(config_arg)
                .arg(env_overrides_arg),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("serve", sub_matches)) => serve(sub_matches).await,
        Some(("generate", sub_matches)) => generate(sub_matches).await,
        Some(("check-config", sub_matches)) => check_config(sub_matches),
        _ => Err(Error::InvalidInput("Invalid subcommand".to_string())),
    }
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a String, Error> {
    matches
        .get_one::<String>(id)
        .ok_or_else(|| Error::InvalidInput(format!("missing argument '{id}'")))
}

fn load_config(matches: &ArgMatches) -> Result<FileConfigSource, Error> {
    let source = FileConfigSource::from_path(required(matches, "config")?)?;

    if matches.get_flag("env_overrides") {
        if let Err(e) = dotenvy::dotenv() {
            warn!("No .env file loaded: {}", e);
        }
        return Ok(source.with_env_overrides());
    }

    Ok(source)
}

async fn serve(matches: &ArgMatches) -> Result<(), Error> {
    let listen_addr: SocketAddr = required(matches, "listen_addr")?
        .parse()
        .map_err(|e| Error::Internal(format!("Failed to parse listen address: {}", e)))?;

    let config = Arc::new(load_config(matches)?);
    let db = Arc::new(InMemoryStateDb::new());
    db.log_system_event(format!("Registry starting on {listen_addr}"))
        .await?;

    let catalog = TemplateCatalog::new(VersionLedger::new(db), config);
    let mut service = GrpcWorkflowTemplateService::new(Arc::new(catalog));
    if let Some(timeout_ms) = matches.get_one::<u64>("request_timeout_ms") {
        service = service.with_request_timeout(Duration::from_millis(*timeout_ms));
    }

    info!("Starting Stencil Registry Server on {}", listen_addr);

    let server_handle = tokio::spawn(async move {
        Server::builder()
            .add_service(service.into_server())
            .serve(listen_addr)
            .await
    });

    tokio::select! {
        res = server_handle => {
            error!("Server stopped: {:?}", res);
            return Err(Error::Internal("gRPC server stopped unexpectedly".to_string()));
        }

        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down server");
        }
    }

    Ok(())
}

async fn generate(matches: &ArgMatches) -> Result<(), Error> {
    let manifest_path = required(matches, "manifest")?;
    let namespace = required(matches, "namespace")?;

    let raw = std::fs::read_to_string(manifest_path).map_err(|e| {
        error!("Failed to read manifest at {}: {}", manifest_path, e);

        Error::Internal(format!("Failed to read manifest at {manifest_path}: {e}"))
    })?;

    let resolved = load_config(matches)?.resolve(namespace).await?;

    let ctx = match matches.get_one::<String>("name") {
        Some(name) => GenerationContext::for_namespace(namespace.as_str()).with_workflow_name(name),
        None => GenerationContext::for_namespace(namespace.as_str()),
    };

    let generated =
        TemplateGenerator::new(&resolved.system, &resolved.namespace).generate(&raw, &ctx)?;

    info!(
        namespace = %namespace,
        parameters = generated.parameters.len(),
        "Generated workflow template"
    );

    let output = if matches.get_flag("parameters") {
        serde_yaml::to_string(&generated.parameters)
            .map_err(|e| Error::Internal(format!("Failed to serialize parameters: {e}")))?
    } else {
        generated.manifest
    };

    std::io::stdout()
        .write_all(output.as_bytes())
        .map_err(|e| Error::Internal(format!("Failed to write output: {e}")))
}

fn check_config(matches: &ArgMatches) -> Result<(), Error> {
    let source = load_config(matches)?;
    let system = source.system();

    let options = system.node_pool_options()?;
    info!(node_pools = options.len(), "Node pool options are valid");

    if system.node_pool_label().is_none() {
        warn!("Node pool label is not configured");
    }

    info!(
        domain = system.domain().unwrap_or("-"),
        fqdn = system.fqdn().unwrap_or("-"),
        database_driver = system.database_driver_name().unwrap_or("-"),
        "System configuration"
    );

    match system.api_protocol() {
        Some(protocol) => info!(protocol, "API protocol"),
        None => warn!("API URL is not configured"),
    }

    for (key, _) in system.iter() {
        info!(key, "system key present");
    }

    Ok(())
}

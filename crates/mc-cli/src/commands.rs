use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use mc_cloud::providerconfig::ConfigVarResolver;
use mc_cloud::types::{Instance, Machine};
use mc_cloud::{CloudProviderName, ProviderRegistry, build_providers};
use mc_userdata::flatcar;
use tracing::info;

use crate::error::{Error, Result, read};
use crate::manifest::load_machine;

/// Drive one machine through its OpenNebula lifecycle.
#[derive(Parser, Debug)]
#[command(name = "one-machine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the machine's provider spec resolves
    Validate(MachineArgs),
    /// Create the machine's VM
    Create(CreateArgs),
    /// Show the machine's VM
    Get(MachineArgs),
    /// Delete the machine's VM
    Delete(MachineArgs),
    /// Print the effective Flatcar provisioning config
    OsConfig(OsConfigArgs),
}

#[derive(Args, Debug)]
pub struct MachineArgs {
    /// Machine manifest (YAML or JSON)
    #[arg(long, env = "ONE_MACHINE_MANIFEST")]
    pub machine: PathBuf,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub machine: MachineArgs,

    /// Rendered userdata passed to the VM as USER_DATA
    #[arg(long)]
    pub userdata: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct OsConfigArgs {
    /// Cloud provider the machine runs on
    #[arg(long, value_parser = parse_cloud)]
    pub cloud: CloudProviderName,

    /// Existing operatingSystemSpec document (JSON)
    #[arg(long)]
    pub spec: Option<PathBuf>,
}

fn parse_cloud(s: &str) -> std::result::Result<CloudProviderName, String> {
    s.parse().map_err(|e: mc_cloud::Error| e.to_string())
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Validate(args) => validate(args).await,
            Commands::Create(args) => create(args).await,
            Commands::Get(args) => get(args).await,
            Commands::Delete(args) => delete(args).await,
            Commands::OsConfig(args) => os_config(args),
        }
    }
}

fn registry() -> ProviderRegistry {
    let providers = build_providers(ConfigVarResolver::default());
    info!(providers = ?providers.available(), "machine providers ready");
    providers
}

/// Load the manifest and apply the provider's defaults to its spec.
fn prepare(args: &MachineArgs, registry: &ProviderRegistry) -> Result<Machine> {
    let mut machine = load_machine(&args.machine)?;
    let provider = registry.for_spec(&machine.spec)?;
    machine.spec = provider.add_defaults(machine.spec)?;
    Ok(machine)
}

fn print_instance(instance: &dyn Instance) {
    println!("name:        {}", instance.name());
    println!("id:          {}", instance.id());
    println!("provider id: {}", instance.provider_id());
    println!("status:      {}", instance.status());
    for (address, kind) in instance.addresses() {
        println!("address:     {address} ({kind:?})");
    }
}

async fn validate(args: MachineArgs) -> Result<()> {
    let registry = registry();
    let machine = prepare(&args, &registry)?;
    let provider = registry.for_spec(&machine.spec)?;

    provider.validate(&machine.spec).await?;
    println!("machine {} is valid", machine.spec.name());
    Ok(())
}

async fn create(args: CreateArgs) -> Result<()> {
    let registry = registry();
    let machine = prepare(&args.machine, &registry)?;
    let provider = registry.for_spec(&machine.spec)?;

    let userdata = match &args.userdata {
        Some(path) => decode_userdata(path, read(path)?)?,
        None => String::new(),
    };

    provider.validate(&machine.spec).await?;
    let instance = match provider.get(&machine).await {
        Ok(existing) => {
            info!(machine = machine.spec.name(), "instance already exists, not creating");
            existing
        }
        Err(e) if e.is_not_found() => provider.create(&machine, &userdata).await?,
        Err(e) => return Err(e.into()),
    };

    print_instance(instance.as_ref());
    Ok(())
}

/// Userdata is embedded in the VM template as text and must not be altered.
fn decode_userdata(path: &Path, raw: Vec<u8>) -> Result<String> {
    String::from_utf8(raw).map_err(|source| Error::UserdataEncoding {
        path: path.to_path_buf(),
        source,
    })
}

async fn get(args: MachineArgs) -> Result<()> {
    let registry = registry();
    let machine = prepare(&args, &registry)?;
    let provider = registry.for_spec(&machine.spec)?;

    let instance = provider.get(&machine).await?;
    print_instance(instance.as_ref());
    Ok(())
}

async fn delete(args: MachineArgs) -> Result<()> {
    let registry = registry();
    let machine = prepare(&args, &registry)?;
    let provider = registry.for_spec(&machine.spec)?;

    if provider.cleanup(&machine).await? {
        println!("machine {} deleted", machine.spec.name());
    } else {
        println!("machine {} is being deleted", machine.spec.name());
    }
    Ok(())
}

fn os_config(args: OsConfigArgs) -> Result<()> {
    let raw = args.spec.as_deref().map(read).transpose()?;
    let config = flatcar::load_config_for_cloud(raw.as_deref(), Some(args.cloud))?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

mod args;

use anyhow::Context;
use args::{Cli, Commands, NetCommands};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use qemuctl::{clienv, Hypervisor, OpenOptions, Registry};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let uri = cli
        .connect
        .clone()
        .unwrap_or_else(|| clienv::default_uri().to_owned());
    let opts = OpenOptions::default()
        .read_only(cli.read_only)
        .autostart(!cli.no_autostart);

    let registry = Registry::with_defaults();
    let mut conn = registry
        .open(&uri, opts)
        .with_context(|| format!("opening {uri}"))?;

    let result = run(&cli, conn.as_ref());
    conn.close()?;
    result
}

fn run(cli: &Cli, conn: &dyn Hypervisor) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Version => {
            let version = conn.version()?;
            // Version is packed major*1_000_000 + minor*1_000 + micro.
            println!(
                "{}.{}.{}",
                version / 1_000_000,
                version / 1_000 % 1_000,
                version % 1_000
            );
        }

        Commands::Nodeinfo => {
            let info = conn.node_info()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("model:    {}", info.model);
                println!("memory:   {} KiB", info.memory);
                println!("cpus:     {}", info.cpus);
                println!("mhz:      {}", info.mhz);
                println!("topology: {} nodes / {} sockets / {} cores / {} threads",
                    info.nodes, info.sockets, info.cores, info.threads);
            }
        }

        Commands::List { defined, max } => {
            if *defined {
                let names = conn.list_defined_domains(*max)?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&names)?);
                } else {
                    for name in names {
                        println!("{name}");
                    }
                }
            } else {
                let ids = conn.list_domains(*max)?;
                let mut domains = Vec::with_capacity(ids.len());
                for id in ids {
                    domains.push(conn.domain_lookup_by_id(id)?);
                }
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&domains)?);
                } else {
                    for d in domains {
                        println!("{:>4}  {}", d.id.map_or(-1, |id| id as i64), d.name);
                    }
                }
            }
        }

        Commands::Lookup { name, id, uuid } => {
            let domain = match (name, id, uuid) {
                (Some(name), None, None) => conn.domain_lookup_by_name(name)?,
                (None, Some(id), None) => conn.domain_lookup_by_id(*id)?,
                (None, None, Some(uuid)) => conn.domain_lookup_by_uuid(uuid)?,
                _ => anyhow::bail!("give exactly one of a name, --id, or --uuid"),
            };
            print_domain(cli, &domain)?;
        }

        Commands::Create { file } => {
            let config = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let domain = conn.domain_create(&config)?;
            print_domain(cli, &domain)?;
        }

        Commands::Define { file } => {
            let config = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let domain = conn.domain_define(&config)?;
            print_domain(cli, &domain)?;
        }

        Commands::Start { name } => {
            let mut domain = conn.domain_lookup_by_name(name)?;
            conn.domain_start(&mut domain)?;
            print_domain(cli, &domain)?;
        }

        Commands::Suspend { name } => {
            let domain = conn.domain_lookup_by_name(name)?;
            conn.domain_suspend(&domain)?;
        }

        Commands::Resume { name } => {
            let domain = conn.domain_lookup_by_name(name)?;
            conn.domain_resume(&domain)?;
        }

        Commands::Destroy { name } => {
            let mut domain = conn.domain_lookup_by_name(name)?;
            conn.domain_destroy(&mut domain)?;
        }

        Commands::Shutdown { name } => {
            let mut domain = conn.domain_lookup_by_name(name)?;
            conn.domain_shutdown(&mut domain)?;
        }

        Commands::Undefine { name } => {
            let domain = conn.domain_lookup_by_name(name)?;
            conn.domain_undefine(domain)?;
        }

        Commands::Info { name } => {
            let domain = conn.domain_lookup_by_name(name)?;
            let info = conn.domain_info(&domain)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("state:      {}", info.state.as_str());
                println!("max memory: {} KiB", info.max_mem);
                println!("memory:     {} KiB", info.memory);
                println!("vcpus:      {}", info.nr_virt_cpu);
                println!("cpu time:   {} ns", info.cpu_time);
            }
        }

        Commands::Dump { name } => {
            let domain = conn.domain_lookup_by_name(name)?;
            println!("{}", conn.domain_dump_config(&domain)?);
        }

        Commands::Net { command } => run_net(cli, conn, command)?,
    }

    Ok(())
}

fn run_net(cli: &Cli, conn: &dyn Hypervisor, command: &NetCommands) -> anyhow::Result<()> {
    match command {
        NetCommands::List { defined, max } => {
            let names = if *defined {
                conn.list_defined_networks(*max)?
            } else {
                conn.list_networks(*max)?
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else {
                for name in names {
                    println!("{name}");
                }
            }
        }

        NetCommands::Lookup { name, uuid } => {
            let network = match (name, uuid) {
                (Some(name), None) => conn.network_lookup_by_name(name)?,
                (None, Some(uuid)) => conn.network_lookup_by_uuid(uuid)?,
                _ => anyhow::bail!("give exactly one of a name or --uuid"),
            };
            print_network(cli, &network)?;
        }

        NetCommands::Create { file } => {
            let config = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let network = conn.network_create(&config)?;
            print_network(cli, &network)?;
        }

        NetCommands::Define { file } => {
            let config = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let network = conn.network_define(&config)?;
            print_network(cli, &network)?;
        }

        NetCommands::Start { name } => {
            let network = conn.network_lookup_by_name(name)?;
            conn.network_start(&network)?;
        }

        NetCommands::Destroy { name } => {
            let network = conn.network_lookup_by_name(name)?;
            conn.network_destroy(&network)?;
        }

        NetCommands::Undefine { name } => {
            let network = conn.network_lookup_by_name(name)?;
            conn.network_undefine(network)?;
        }

        NetCommands::Dump { name } => {
            let network = conn.network_lookup_by_name(name)?;
            println!("{}", conn.network_dump_config(&network)?);
        }

        NetCommands::Bridge { name } => {
            let network = conn.network_lookup_by_name(name)?;
            println!("{}", conn.network_bridge_name(&network)?);
        }
    }

    Ok(())
}

fn print_domain(cli: &Cli, domain: &qemuctl::Domain) -> anyhow::Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(domain)?);
    } else {
        match domain.id {
            Some(id) => println!("{} (id {}, uuid {})", domain.name, id, domain.uuid),
            None => println!("{} (defined, uuid {})", domain.name, domain.uuid),
        }
    }
    Ok(())
}

fn print_network(cli: &Cli, network: &qemuctl::Network) -> anyhow::Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(network)?);
    } else {
        println!("{} (uuid {})", network.name, network.uuid);
    }
    Ok(())
}

mod cli;
mod config;
mod stores;

use clap::Parser;
use color_eyre::Result;
use keyhaven_core::SecretResolver;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::stores::AccessFlags;

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    let flags = AccessFlags {
        password: cli.password.clone(),
        user_override: cli.user_override,
        container_mode: cli.container_mode,
    };
    let store = cli.store.as_deref();
    let resolver = || stores::build_resolver(&config, &flags);

    match cli.command {
        cli::Command::Init => run_init(&config, &flags)?,
        cli::Command::Get { key, default } => {
            run_get(&resolver()?, &key, store, default.as_deref())?
        }
        cli::Command::Set { key, value } => {
            resolver()?.set_secret(&key, &value, store)?;
            println!("Stored '{key}'");
        }
        cli::Command::Delete { key } => {
            resolver()?.delete_secret(&key, store)?;
            println!("Deleted '{key}'");
        }
        cli::Command::Create { name, length } => {
            let value = resolver()?.create_secret(&name, length, store)?;
            println!("{value}");
        }
        cli::Command::Stores => print_stores(&resolver()?),
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn run_init(config: &config::Config, flags: &AccessFlags) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());

    // Opening the stores runs migration and creates the keystore files.
    let resolver = stores::build_resolver(config, flags)?;
    print_stores(&resolver);
    Ok(())
}

fn run_get(
    resolver: &SecretResolver,
    key: &str,
    store: Option<&str>,
    default: Option<&str>,
) -> Result<()> {
    match resolver.get_secret(key, store, default)? {
        Some(value) => println!("{value}"),
        None => color_eyre::eyre::bail!("secret '{key}' not found in any store"),
    }
    Ok(())
}

fn print_stores(resolver: &SecretResolver) {
    for name in resolver.store_names() {
        // store_names only yields names present in the resolver.
        if let Some(store) = resolver.store(name) {
            let mut status = if store.store_available() { "available" } else { "unavailable" };
            if store.store_available() && store.store_read_only() {
                status = "read-only";
            }
            println!(
                "{name} (priority {priority}): {status}",
                priority = store.store_priority()
            );
        }
    }
}

use clap::Parser;
use page_assist::cli::commands::{
    SettingsUpdate, cmd_complete, cmd_selectors_add, cmd_selectors_clear, cmd_selectors_delete,
    cmd_selectors_list, cmd_selectors_normalize, cmd_settings_set, cmd_settings_show,
};
use page_assist::cli::config::{
    Cli, Commands, SelectorsAction, SettingsAction, build_client_options, load_config, resolve_store_path,
};
use page_assist::completion::client::CompletionClient;
use page_assist::settings::store::FileStore;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref());

    // Resolve settings: CLI > config > env > defaults
    let store = FileStore::new(resolve_store_path(cli.store.as_deref(), &config));
    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::Complete {
            prompt,
            element_prompt,
        } => {
            let client = CompletionClient::new(build_client_options(cli.endpoint.as_deref(), &config))?;
            cmd_complete(&store, &client, &prompt, element_prompt.as_deref(), &mut stdout)?;
        }
        Commands::Settings { action } => match action {
            SettingsAction::Show => cmd_settings_show(&store, &mut stdout)?,
            SettingsAction::Set {
                api_key,
                model,
                ignored_urls,
                custom_prompt,
            } => {
                cmd_settings_set(
                    &store,
                    SettingsUpdate {
                        api_key,
                        model,
                        ignored_urls,
                        custom_prompt,
                    },
                )?;
                println!("Settings saved to {}", store.path().display());
            }
        },
        Commands::Selectors { action } => match action {
            SelectorsAction::List { domain } => {
                cmd_selectors_list(&store, domain.as_deref(), &mut stdout)?;
            }
            SelectorsAction::Add {
                domain,
                selector,
                url,
                prompt,
            } => {
                if cmd_selectors_add(&store, &domain, &selector, &url, prompt.as_deref())? {
                    println!("Added {} for {}", selector, domain);
                } else {
                    println!("{} is already registered for {}", selector, domain);
                }
            }
            SelectorsAction::Delete { domain, index } => {
                let removed = cmd_selectors_delete(&store, &domain, index)?;
                println!("Deleted {} from {}", removed.selector, domain);
            }
            SelectorsAction::Clear { domain } => {
                let n = cmd_selectors_clear(&store, &domain)?;
                println!("Cleared {} selectors for {}", n, domain);
            }
            SelectorsAction::Normalize => {
                if cmd_selectors_normalize(&store)? {
                    println!("Rewrote legacy selector records");
                } else {
                    println!("Selector records already current");
                }
            }
        },
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise info, or debug with -v.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

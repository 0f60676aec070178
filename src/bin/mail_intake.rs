use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use mail_intake::api::client::DeliveryClient;
use mail_intake::auth::token_store;
use mail_intake::config::load_config;
use mail_intake::daemon::IntakeLoop;
use mail_intake::daemon::fifo::NamedPipe;
use mail_intake::mail::normalizer::Normalizer;
use mail_intake::store::dead_letter::DeadLetterBox;
use mail_intake::store::jsonl::JsonlStore;
use mail_intake::store::repo::RecordStore;

#[derive(Parser)]
#[command(name = "mail_intake")]
#[command(about = "Named-pipe mail intake (normalize, store, forward)", long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/mail_intake/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the pipe and process messages until killed
    Run,

    /// Normalize a raw .eml file and print the record (no store, no delivery)
    Parse { file: PathBuf },

    /// Print the most recently stored records
    Recent {
        #[arg(long, default_value_t = 10)]
        count: usize,
    },

    /// Store the system account password in the keyring
    SetPassword,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref()).map_err(|e| anyhow!("Configuration error: {e}"))?;

    match cli.cmd {
        Command::SetPassword => {
            eprintln!("Paste password for {} (end with Ctrl-D):", cfg.system_email);
            let mut password = String::new();
            std::io::Read::read_to_string(&mut std::io::stdin(), &mut password)?;
            token_store::save_password(&cfg.system_email, password.trim())?;
            println!("Saved password for {}", cfg.system_email);
            Ok(())
        }

        Command::Parse { file } => {
            let raw = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let normalizer = Normalizer::new(cfg.strip_html, cfg.body_preference);
            let email = normalizer.normalize(&raw)?;
            println!("{}", serde_json::to_string_pretty(&email)?);
            Ok(())
        }

        Command::Recent { count } => {
            let store = JsonlStore::new(&cfg.output_file);
            for email in store.recent(count)? {
                println!("{}", serde_json::to_string(&email)?);
            }
            Ok(())
        }

        Command::Run => {
            let store = JsonlStore::new(&cfg.output_file);
            let delivery = DeliveryClient::new(cfg.api_config()?)?;
            let normalizer = Normalizer::new(cfg.strip_html, cfg.body_preference);

            let mut intake = IntakeLoop::new(
                NamedPipe::new(&cfg.pipe_path),
                normalizer,
                &store,
                delivery,
                cfg.retry.policy(),
            );
            if let Some(dir) = &cfg.dead_letter_dir {
                intake = intake.with_dead_letters(DeadLetterBox::new(dir));
            }

            intake.run()
        }
    }
}

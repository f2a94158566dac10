//! Interactive terminal chat.
//!
//! Reads one message per line from stdin and prints the reply. Replies are
//! spoken when speech is enabled; typing the next line interrupts playback.
//!
//! Usage: `colloquy-chat [--config <path>] [--quiet] [--list-devices]`

use std::path::PathBuf;

use colloquy::config::{default_config_path, load_config};
use colloquy::engine::{UserInput, bootstrap};
use tokio::io::{AsyncBufReadExt, BufReader};

struct Args {
    config: PathBuf,
    speak: bool,
    list_devices: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: default_config_path(),
        speak: true,
        list_devices: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config needs a path"))?;
                args.config = PathBuf::from(path);
            }
            "--quiet" | "-q" => args.speak = false,
            "--list-devices" => args.list_devices = true,
            "--help" | "-h" => {
                println!("usage: colloquy-chat [--config <path>] [--quiet] [--list-devices]");
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;
    if args.list_devices {
        return list_devices();
    }
    let config = load_config(&args.config)?;
    let engine = bootstrap(&config, args.speak).await?;

    println!("colloquy v{} (Ctrl-D to quit)", env!("CARGO_PKG_VERSION"));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut session_id = None;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let outcome = engine
            .handle_message(UserInput::text(session_id, line))
            .await;
        session_id = Some(outcome.session_id);

        for executed in &outcome.reply.tool_calls {
            tracing::debug!(tool_name = %executed.call.name, result = %executed.result.text, "tool call");
        }
        println!("> {}", outcome.reply.final_text);
    }

    engine.shutdown().await;
    tracing::info!("colloquy-chat shut down cleanly");
    Ok(())
}

#[cfg(feature = "playback")]
fn list_devices() -> anyhow::Result<()> {
    for name in colloquy::tts::CpalSink::list_output_devices()? {
        println!("{name}");
    }
    eprintln!("set speech.output_device to one of these names");
    Ok(())
}

#[cfg(not(feature = "playback"))]
fn list_devices() -> anyhow::Result<()> {
    anyhow::bail!("built without the playback feature; no output devices available")
}

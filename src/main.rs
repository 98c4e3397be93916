//! pi-ai binary entry point

use std::{io::Write, sync::Arc, time::Duration};

use color_eyre::{eyre::eyre, Result};
use pi_ai::{
    cli::{demo_tool_result, Cli, Commands, PromptArgs},
    config::Config,
    messages::{AssistantMessage, Content},
    services::{streaming::AssistantMessageEvent, Provider, ProviderRegistry},
    PiError,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Install error handler
    color_eyre::install()?;

    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    match cli.command {
        Some(Commands::Stream(args)) => run_stream(&args).await?,
        Some(Commands::Complete(args)) => run_complete(&args).await?,
        Some(Commands::Models) => list_models()?,
        Some(Commands::Init { force }) => init_config(force)?,
        Some(Commands::Version) | None => {
            println!("pi-ai version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("pi_ai=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_provider(args: &PromptArgs) -> Result<Arc<dyn Provider>> {
    let config = Config::load()?;
    let registry = ProviderRegistry::from_config(&config);

    let model = match &args.model {
        Some(model) => model.clone(),
        None => registry
            .list_models(args.provider)
            .into_iter()
            .next()
            .ok_or_else(|| eyre!("no models configured for provider {}", args.provider))?,
    };

    Ok(registry.get(args.provider, &model)?)
}

/// Cancel on Ctrl-C or after the optional timeout
fn cancel_on_interrupt(timeout: Option<u64>) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::debug!("Interrupted"),
            () = deadline => tracing::debug!("Timed out"),
            () = token.cancelled() => return,
        }
        token.cancel();
    });

    cancel
}

async fn run_stream(args: &PromptArgs) -> Result<()> {
    let provider = resolve_provider(args)?;
    let mut context = args.context();
    let cancel = cancel_on_interrupt(args.timeout);

    let mut stream = provider.stream(&context, cancel.clone());
    let mut stdout = std::io::stdout();
    while let Some(event) = stream.next().await {
        match event {
            AssistantMessageEvent::TextDelta { delta, .. } => {
                print!("{delta}");
                stdout.flush()?;
            }
            AssistantMessageEvent::TextEnd { .. } => println!(),
            AssistantMessageEvent::ToolcallEnd { tool_call, .. } => {
                println!(
                    "[tool call] {}({})",
                    tool_call.name,
                    serde_json::Value::Object(tool_call.arguments)
                );
            }
            AssistantMessageEvent::Done { reason, .. } => eprintln!("[done: {reason}]"),
            AssistantMessageEvent::Error { partial, .. } => {
                eprintln!("[error: {}]", partial.error_message.unwrap_or_default());
            }
            AssistantMessageEvent::Start
            | AssistantMessageEvent::TextStart { .. }
            | AssistantMessageEvent::ToolcallStart { .. }
            | AssistantMessageEvent::ToolcallDelta { .. } => {}
        }
    }

    let message = match stream.outcome().await {
        Ok(message) => message,
        Err(PiError::Cancelled) => {
            eprintln!("[cancelled]");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    cancel.cancel();

    let calls: Vec<_> = message.tool_calls().into_iter().cloned().collect();
    if !args.with_tools || calls.is_empty() {
        return Ok(());
    }

    context.push(message);
    for call in &calls {
        context.push(demo_tool_result(call));
    }

    eprintln!("[answering {} tool call(s)]", calls.len());
    let follow_up = provider.complete(&context).await?;
    print_message(&follow_up);
    Ok(())
}

async fn run_complete(args: &PromptArgs) -> Result<()> {
    let provider = resolve_provider(args)?;
    let message = provider.complete(&args.context()).await?;
    print_message(&message);
    eprintln!("[done: {}]", message.stop_reason);
    Ok(())
}

fn print_message(message: &AssistantMessage) {
    for content in &message.contents {
        match content {
            Content::Text { text } => println!("{text}"),
            Content::ToolCall(call) => println!("[tool call] {}", call.name),
            Content::Image { mime_type, .. } => println!("[image {mime_type}]"),
        }
    }
}

fn init_config(force: bool) -> Result<()> {
    let path = Config::global_config_path();
    if path.exists() && !force {
        return Err(eyre!("{} already exists, pass --force to overwrite", path.display()));
    }

    let config = Config::from_env()?;
    config.save_to_path(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn list_models() -> Result<()> {
    let config = Config::load()?;
    let registry = ProviderRegistry::from_config(&config);

    for provider in registry.list_providers() {
        println!("{provider}");
        for model in registry.list_models(provider) {
            println!("  {model}");
        }
    }
    Ok(())
}

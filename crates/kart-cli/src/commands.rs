use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use colored::Colorize;

use kart_archive::{package, Catalog, ListOptions, SortOrder, StoreRequest};
use kart_config::KartConfig;
use kart_release::{FnReporter, ProgressEvent, PromoteOptions, PromotionEngine, ReleaseError};
use kart_store::{BlobStore, FsBlobStore};
use kart_types::{Build, Release};

use crate::cli::*;

/// Store root used when the configuration names none.
const DEFAULT_STORAGE_ROOT: &str = ".kart";

struct Context {
    catalog: Catalog,
    engine: PromotionEngine,
    format: OutputFormat,
}

impl Context {
    fn open(config: KartConfig, format: OutputFormat) -> Self {
        let root = config
            .storage
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT));
        tracing::debug!(root = %root.display(), "opening filesystem store");

        let store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(root));
        let config = Arc::new(config);
        Self {
            catalog: Catalog::new(store.clone(), config.clone()),
            engine: PromotionEngine::new(store, config),
            format,
        }
    }

    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = KartConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    let ctx = Context::open(config, cli.format);

    match cli.command {
        Command::Archive(args) => match args.action {
            ArchiveAction::Store(args) => cmd_store(&ctx, args).await,
            ArchiveAction::List(args) => cmd_list(&ctx, args).await,
            ArchiveAction::Remove(args) => cmd_remove(&ctx, args).await,
            ArchiveAction::Download(args) => cmd_download(&ctx, args).await,
        },
        Command::Release(args) => cmd_release(&ctx, args).await,
        Command::Status(args) => cmd_status(&ctx, args).await,
    }
}

async fn cmd_store(ctx: &Context, args: StoreArgs) -> anyhow::Result<()> {
    let mut request = StoreRequest::new(&args.dir, &args.project, &args.channel, &args.version);
    request.arch = args.arch;
    request.ext = args.ext;
    request.name_pattern = args.name_pattern;
    request.metadata.extend(args.metadata);

    let build = ctx.catalog.store(request).await?;
    if ctx.json() {
        println!("{}", serde_json::to_string_pretty(&build)?);
    } else {
        println!(
            "{} Stored {}/{} {} as build {}",
            "✓".green().bold(),
            build.project,
            build.channel,
            build.version.yellow(),
            format!("#{}", build.number).bold()
        );
        println!("  Key: {}", build.key().cyan());
    }
    Ok(())
}

async fn cmd_list(ctx: &Context, args: ListArgs) -> anyhow::Result<()> {
    let mut opts = ListOptions::new();
    for (field, value) in args.filter {
        opts = opts.filter(field, value);
    }
    if !args.sort.is_empty() {
        let order = if args.desc {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };
        opts = opts.sort_by(args.sort, order);
    }
    opts.limit = args.limit;

    let builds = ctx.catalog.list(&args.project, &args.channel, &opts).await?;
    if ctx.json() {
        println!("{}", serde_json::to_string_pretty(&builds)?);
        return Ok(());
    }
    if builds.is_empty() {
        println!("No builds in {}/{}.", args.project, args.channel);
        return Ok(());
    }
    for build in &builds {
        print_build_line(build);
    }
    Ok(())
}

fn print_build_line(build: &Build) {
    println!(
        "{:>6}  {:<16} {:<8} {}",
        format!("#{}", build.number).yellow().bold(),
        build.version,
        build.arch,
        build.key().dimmed()
    );
    for (key, value) in &build.metadata {
        println!("        {}: {}", key.cyan(), value);
    }
}

async fn find(ctx: &Context, build: &BuildRef) -> anyhow::Result<Build> {
    Ok(ctx
        .catalog
        .get(&build.project, &build.channel, build.number)
        .await?)
}

async fn cmd_remove(ctx: &Context, args: BuildRef) -> anyhow::Result<()> {
    let build = find(ctx, &args).await?;
    ctx.catalog.remove(&build).await?;
    if ctx.json() {
        println!("{}", serde_json::to_string_pretty(&build)?);
    } else {
        println!("{} Removed {}", "✓".green().bold(), build.key().cyan());
    }
    Ok(())
}

async fn cmd_download(ctx: &Context, args: DownloadArgs) -> anyhow::Result<()> {
    let build = find(ctx, &args.build).await?;
    let data = ctx.catalog.fetch(&build).await?;

    let dest = args.dest.clone();
    tokio::task::spawn_blocking(move || package::unpack(&data, &dest))
        .await?
        .with_context(|| format!("failed to extract into {}", args.dest.display()))?;

    if ctx.json() {
        println!("{}", serde_json::to_string_pretty(&build)?);
    } else {
        println!(
            "{} Extracted build {} into {}",
            "✓".green().bold(),
            format!("#{}", build.number).bold(),
            args.dest.display()
        );
    }
    Ok(())
}

async fn cmd_release(ctx: &Context, args: ReleaseArgs) -> anyhow::Result<()> {
    let build = find(ctx, &args.build).await?;
    if args.record_only {
        return cmd_record(ctx, &build, &args.track).await;
    }

    let mut opts = PromoteOptions::track(&args.track);
    // Explicit flag, then the pattern recorded at store time; the engine
    // falls back to the track's configured default.
    opts.name_pattern = match args.name_pattern {
        Some(pattern) => Some(pattern),
        None => ctx.catalog.name_pattern(&build).await?,
    };
    if let Some(secs) = args.timeout {
        opts = opts.timeout(Duration::from_secs(secs));
    }
    if !ctx.json() {
        opts = opts.reporter(Arc::new(FnReporter(|event: &ProgressEvent| {
            println!("  {}", event.message.dimmed());
        })));
    }

    let release = match ctx.engine.release(&build, opts).await {
        Ok(release) => release,
        Err(err @ ReleaseError::ManifestWrite { .. }) if err.is_copied_but_unrecorded() => {
            let retry = format!(
                "kart release {} {} {} --track {} --record-only",
                build.project, build.channel, build.number, args.track
            );
            return Err(err).context(format!(
                "archive was copied but not recorded; run `{retry}` to record it"
            ));
        }
        Err(err) => return Err(err.into()),
    };

    if ctx.json() {
        println!("{}", serde_json::to_string_pretty(&release)?);
    } else {
        println!(
            "{} Released {} onto {}",
            "✓".green().bold(),
            release.display_name().bold(),
            args.track.yellow()
        );
        print_release_details(&release);
    }
    Ok(())
}

async fn cmd_record(ctx: &Context, build: &Build, track: &str) -> anyhow::Result<()> {
    ctx.engine.record(build, track).await?;
    if ctx.json() {
        let current = ctx.engine.status(&build.project, track).await?;
        println!("{}", serde_json::to_string_pretty(&current)?);
    } else {
        println!(
            "{} Recorded build {} as released on {}",
            "✓".green().bold(),
            format!("#{}", build.number).bold(),
            track.yellow()
        );
    }
    Ok(())
}

fn print_release_details(release: &Release) {
    println!("  Key: {}", release.key().cyan());
    if let Some(date) = release.release_date {
        println!("  Date: {}", date.to_rfc3339());
    }
}

async fn cmd_status(ctx: &Context, args: StatusArgs) -> anyhow::Result<()> {
    let current = ctx.engine.status(&args.project, &args.channel).await?;
    if ctx.json() {
        println!("{}", serde_json::to_string_pretty(&current)?);
        return Ok(());
    }
    match current {
        Some(release) => {
            let b = &release.build;
            println!(
                "{}/{}: build {} ({} {})",
                args.project.bold(),
                args.channel.yellow(),
                format!("#{}", b.number).bold(),
                b.version,
                b.arch
            );
            println!("  From channel: {}", b.channel);
            print_release_details(&release);
        }
        None => println!("Nothing released on {}/{}.", args.project, args.channel),
    }
    Ok(())
}

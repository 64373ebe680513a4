use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use image::GenericImageView;
use tracing_subscriber::EnvFilter;

use preview_pipeline::{ResourceDescriptor, Slot, SlotEvent, Submission};

/// Resolve a file or URL into a locally cached copy, a bounded preview
/// image and a human-readable description.
#[derive(Parser, Debug)]
#[command(name = "preview")]
#[command(about = "Resolve a file or URL into a local copy, preview icon and description")]
struct Args {
    /// File path or URL to resolve
    input: String,

    /// Display name to attach to the resource
    #[arg(short, long)]
    name: Option<String>,

    /// Preview bounding box width in pixels
    #[arg(long, default_value_t = 50)]
    max_width: u32,

    /// Preview bounding box height in pixels
    #[arg(long, default_value_t = 50)]
    max_height: u32,

    /// Write the preview icon to this PNG file
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Also preview resources that are not recognized image files
    #[arg(long)]
    all_files: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let slot = if args.all_files {
        Slot::for_any_resource()
    } else {
        Slot::for_images()
    };
    slot.set_icon_bounds(args.max_width, args.max_height);
    let mut events = slot.subscribe();

    let mut descriptor = ResourceDescriptor::parse(&args.input)?;
    if let Some(name) = args.name {
        descriptor = descriptor.with_name(name);
    }

    let value = match slot.submit(Some(descriptor)) {
        Submission::Applied(value) => value,
        Submission::Scheduled(_unit) => loop {
            match events.recv().await? {
                SlotEvent::Loading { descriptor } => {
                    eprintln!("loading {} ...", descriptor.label());
                }
                SlotEvent::Error { message } => {
                    eprintln!("warning: {message}");
                }
                SlotEvent::ValueChanged { new, .. } => break new,
            }
        },
    };

    let Some(value) = value else {
        println!("nothing to resolve");
        return Ok(());
    };

    println!("name:        {}", value.name().unwrap_or("<none>"));
    if let Some(local) = value.local_file() {
        let kind = if local.is_temporary() { "temp copy" } else { "local file" };
        println!("{kind:<12} {}", local.path().display());
    }
    if let Some(description) = value.description() {
        println!("description: {description}");
    }
    if value.is_missing() {
        eprintln!("no preview could be decoded; using the broken-image placeholder");
    }

    if let (Some(out), Some(icon)) = (args.out, value.icon()) {
        icon.save(&out)?;
        println!("icon:        {} ({}x{})", out.display(), icon.width(), icon.height());
    }

    Ok(())
}

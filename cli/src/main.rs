use std::fs::File;
use std::io::Write;

use clap::{Parser, Subcommand};
use fatdefrag_core::FileDevice;
use fatdefrag_filesystems::fat32::{analyze, Catalog, DefragEngine, Fat32Volume};

#[derive(Parser)]
#[command(name = "fatdefrag")]
#[command(about = "FAT32 volume image defragmenter", long_about = None)]
struct Cli {
    /// Enable debug tracing of every swap and chain walk
    #[arg(short = 'x', long, global = true)]
    debug: bool,

    /// Write log output to a file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report fragmentation without modifying the image
    Analyze {
        /// Path to the FAT32 volume image
        image: String,
    },
    /// Defragment the image in place
    Defrag {
        /// Path to the FAT32 volume image
        image: String,
        /// Skip defragmentation when fragmentation is at or below this percentage
        #[arg(short, long, default_value_t = 0)]
        threshold: u32,
    },
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug { "debug" } else { "info" };
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level),
    );
    if let Some(path) = &cli.log_file {
        let file = File::create(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn draw_progress(done: u64, total: u64) {
    const WIDTH: u64 = 30;
    let filled = if total == 0 {
        WIDTH
    } else {
        (done.min(total) * WIDTH) / total
    };
    let mut bar = String::with_capacity(WIDTH as usize + 2);
    for i in 0..WIDTH {
        bar.push(if i < filled {
            '='
        } else if i == filled {
            '>'
        } else {
            ' '
        });
    }
    let percent = if total == 0 { 100 } else { done.min(total) * 100 / total };
    print!("\r[{}] {:3}%", bar, percent);
    let _ = std::io::stdout().flush();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match cli.command {
        Commands::Analyze { image } => {
            let device = FileDevice::open(&image)?;
            let mut volume = Fat32Volume::mount(device)?;
            println!("Mounted {}: {}", image, volume.geometry());

            let mut catalog = Catalog::new();
            let report = analyze(&mut volume, &mut catalog)?;
            println!("Cataloged entries:  {}", catalog.len());
            println!("Used clusters:      {}", report.used_clusters);
            println!("Fragmentation:      {:.2}%", report.fragmentation_percent);
        }
        Commands::Defrag { image, threshold } => {
            let device = FileDevice::open(&image)?;
            let mut volume = Fat32Volume::mount(device)?;
            println!("Mounted {}: {}", image, volume.geometry());

            let mut catalog = Catalog::new();
            let report = analyze(&mut volume, &mut catalog)?;
            println!("Cataloged entries:  {}", catalog.len());
            println!("Used clusters:      {}", report.used_clusters);
            println!("Fragmentation:      {:.2}%", report.fragmentation_percent);

            if (report.fragmentation_percent as u32) <= threshold {
                println!("Fragmentation at or below {}%, nothing to do.", threshold);
                return Ok(());
            }

            {
                let mut engine =
                    DefragEngine::new(&mut volume, &mut catalog, report.used_clusters)
                        .with_progress(Box::new(draw_progress));
                engine.defragment_table()?;
            }
            println!();

            let mut catalog = Catalog::new();
            let report = analyze(&mut volume, &mut catalog)?;
            println!("Fragmentation after: {:.2}%", report.fragmentation_percent);
        }
    }

    Ok(())
}

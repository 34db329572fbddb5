use ab_pos_plot::{OsFileSystem, PlotConfig, create_plot};
use anyhow::Context;
use bytesize::ByteSize;
use clap::Parser;
use hex::FromHex;
use std::path::PathBuf;

/// Arguments for plot creation
#[derive(Debug, Parser)]
pub(crate) struct CreateArgs {
    /// Path of the plot file, existing file is overwritten
    path: PathBuf,
    /// Size parameter, the first table has `2^k` entries
    #[arg(long)]
    k: u8,
    /// Unique plot id, 32 bytes in hex
    #[arg(long)]
    plot_id: String,
    /// Arbitrary memo stored in the header, in hex
    #[arg(long, default_value = "")]
    memo: String,
    /// Memory available for sorting tables, larger tables are sorted using a spare file next to
    /// the plot
    #[arg(long, default_value_t = ByteSize::b(PlotConfig::DEFAULT_AVAILABLE_MEMORY))]
    available_memory: ByteSize,
    /// Max number of entries in a single bucket, larger buckets abort plotting
    #[arg(long, default_value_t = PlotConfig::DEFAULT_MAX_BUCKET_SIZE)]
    max_bucket_size: usize,
}

pub(crate) fn create(create_args: CreateArgs) -> anyhow::Result<()> {
    let CreateArgs {
        path,
        k,
        plot_id,
        memo,
        available_memory,
        max_bucket_size,
    } = create_args;

    let config = PlotConfig {
        k,
        plot_id: <[u8; 32]>::from_hex(&plot_id).context("Invalid plot id")?,
        memo: hex::decode(&memo).context("Invalid memo")?,
        available_memory: available_memory.as_u64(),
        max_bucket_size,
    };
    config.validate()?;

    let summary = create_plot(&OsFileSystem, &path, &config)
        .with_context(|| format!("Failed to create plot {}", path.display()))?;

    println!("Plot: {}", path.display());
    println!("  Size: {}", ByteSize::b(summary.plot_size()).display().iec());
    for table in &summary.tables {
        println!(
            "  Table {}: {} entries, {}",
            table.table_number,
            table.entries,
            ByteSize::b(table.bytes).display().iec()
        );
    }

    Ok(())
}

use ab_pos_plot::{FileSystem, OsFileSystem, PlotReader};
use anyhow::Context;
use bytesize::ByteSize;
use std::path::PathBuf;

pub(crate) fn info(plots: &[PathBuf]) -> anyhow::Result<()> {
    for path in plots {
        let file = OsFileSystem
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let reader = PlotReader::open(file)
            .with_context(|| format!("Failed to read plot {}", path.display()))?;
        let header = reader.header();

        println!("Plot: {}", path.display());
        println!("  k: {}", header.k);
        println!("  Plot id: {}", hex::encode(header.plot_id));
        if !header.memo.is_empty() {
            println!("  Memo: {}", hex::encode(&header.memo));
        }
        for table in reader.tables() {
            println!(
                "  Table {}: {} entries, {} ({} bytes per entry)",
                table.table_number,
                table.entries,
                ByteSize::b(table.bytes).display().iec(),
                table.entry_len
            );
        }
    }

    Ok(())
}

use std::env;
use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use wipecheck::extents::{check_extents, decode_runs, Extent};
use wipecheck::fill::{fill_to_percent, VolumeRootSink};
use wipecheck::os;
use wipecheck::scan::scan_volume;
use wipecheck::volume::BitmapSource;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "info" => {
            let Some(volume) = args.next() else {
                bail!("info requires a volume argument, e.g. E:");
            };
            info_cmd(&volume)
        }
        "extents" => {
            let Some(path) = args.next() else {
                bail!("extents requires a file path argument");
            };
            extents_cmd(&path)
        }
        "search" => {
            let Some(volume) = args.next() else {
                bail!("search requires <volume> <pattern>");
            };
            let Some(pattern) = args.next() else {
                bail!("search requires <volume> <pattern>");
            };
            search_cmd(&volume, pattern.as_bytes())
        }
        "fill" => {
            let Some(volume) = args.next() else {
                bail!("fill requires <volume> <target-percent>");
            };
            let Some(percent) = args.next() else {
                bail!("fill requires <volume> <target-percent>");
            };
            let percent: u32 = percent
                .parse()
                .with_context(|| format!("invalid target percentage: {percent}"))?;
            fill_cmd(&volume, percent)
        }
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            bail!("unknown command: {command}")
        }
    }
}

fn info_cmd(volume: &str) -> Result<()> {
    let info = os::volume_info(volume)?;
    println!("filesystem:          {}", info.filesystem);
    println!("bytes per sector:    {}", info.bytes_per_sector);
    println!("sectors per cluster: {}", info.sectors_per_cluster);
    println!("bytes per cluster:   {}", info.bytes_per_cluster());
    println!("total clusters:      {}", info.total_clusters);
    println!("total bytes:         {}", info.total_bytes());
    Ok(())
}

fn extents_cmd(path: &str) -> Result<()> {
    let file = File::open(path).with_context(|| format!("cannot open {path}"))?;
    let runs = os::file_retrieval_pointers(&file)?;
    if runs.is_empty() {
        println!("{path}: resident, no extents");
        return Ok(());
    }

    let extents: Vec<Extent> = decode_runs(runs)
        .collect::<Result<_, _>>()
        .with_context(|| format!("cannot decode run list for {path}"))?;
    for extent in &extents {
        println!(
            "clusters {}..={} ({} clusters)",
            extent.start,
            extent.end,
            extent.cluster_count()
        );
    }

    let volume = volume_of(path);
    let info = os::volume_info(&volume)?;
    let mut bitmaps = os::VolumeBitmapSource::new(&volume)?;
    let bitmap = bitmaps.volume_bitmap(info.total_clusters)?;
    let (free, allocated) = check_extents(&extents, &bitmap);
    println!("allocated: {allocated}, free: {free}");
    Ok(())
}

fn search_cmd(volume: &str, pattern: &[u8]) -> Result<()> {
    let info = os::volume_info(volume)?;
    let mut handle = os::open_volume_for_search(volume)?;
    let mut bitmaps = os::VolumeBitmapSource::new(volume)?;
    let outcome = scan_volume(&mut handle, &info, pattern, &mut bitmaps)?;
    match (outcome.found, outcome.matched_cluster) {
        // Per-hit detail was already logged during the scan
        (true, Some(cluster)) => println!("pattern found (last hit: cluster {cluster})"),
        _ => println!("pattern not found"),
    }
    Ok(())
}

fn fill_cmd(volume: &str, percent: u32) -> Result<()> {
    let info = os::volume_info(volume)?;
    let mut bitmaps = os::VolumeBitmapSource::new(volume)?;
    let root = if volume.ends_with('\\') {
        volume.to_string()
    } else {
        format!("{volume}\\")
    };
    let mut sink = VolumeRootSink::new(Path::new(&root));
    let written = fill_to_percent(&info, percent, &mut bitmaps, &mut sink)?;
    println!("wrote {} filler file(s)", written.len());
    Ok(())
}

/// Volume root for a file path, e.g. `E:\dir\f.dat` → `E:\`.
fn volume_of(path: &str) -> String {
    path.get(..3)
        .filter(|p| p.ends_with('\\') && p.as_bytes().get(1) == Some(&b':'))
        .map(str::to_string)
        .unwrap_or_else(|| path.to_string())
}

fn print_usage() {
    println!("usage: wipecheck <command> [args]");
    println!();
    println!("commands:");
    println!("  info <volume>                  volume geometry and filesystem");
    println!("  extents <file>                 file's physical extents and allocation state");
    println!("  search <volume> <pattern>      scan the raw volume for a byte pattern");
    println!("  fill <volume> <percent>        fill the volume to a target occupancy");
    println!("  help                           this message");
}

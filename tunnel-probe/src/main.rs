use anyhow::{anyhow, Context};
use clap::Parser;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tunnel_strata::zone::memory::MemoryZoneStore;
use tunnel_strata::{EncapsulationKind, TunnelConfig, Tunneler};

mod packet_metadata;
mod process;
mod stats;

use packet_metadata::CapturedFrame;

#[derive(Parser, Debug)]
#[command(name = "tunnel-probe")]
#[command(about = "Decapsulates GRE/CAPWAP tunnel traffic from a capture", long_about = None)]
struct Args {
    /// Path to the pcap or pcapng file to read
    #[arg(short, long, value_name = "FILE")]
    pcap: PathBuf,

    /// Encapsulation expected on the outer frames (gre, capwap)
    #[arg(short, long, default_value = "capwap")]
    encap: EncapsulationKind,

    /// TOML tunnel configuration (ports, keys, checksums)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print every frame with its outer addressing and inner layers
    #[arg(short, long)]
    dump: bool,

    /// Print statistics at the end
    #[arg(short, long)]
    stats: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let stats = stats::Stats::default();

    if let Err(e) = run(&args, &stats) {
        error!("{:#}", e);
        std::process::exit(1);
    }
    if args.stats {
        println!("{stats}");
    }
}

fn run(args: &Args, stats: &stats::Stats) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => TunnelConfig::default(),
    };
    let tunneler = Tunneler::with_config(MemoryZoneStore::new(), config)
        .context("invalid tunnel configuration")?;

    info!("Reading capture: {:?} ({} expected)", args.pcap, args.encap);
    process_pcap(&args.pcap, args, &tunneler, stats)
}

fn load_config(path: &Path) -> anyhow::Result<TunnelConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: TunnelConfig =
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

fn check_linktype(linktype: Linktype) {
    if linktype != Linktype::ETHERNET {
        warn!("Link type {:?} is not Ethernet, frames will not decapsulate", linktype);
    }
}

/// Runs every frame of the capture through the tunneler
fn process_pcap(
    pcap_path: &Path,
    args: &Args,
    tunneler: &Tunneler<MemoryZoneStore>,
    stats: &stats::Stats,
) -> anyhow::Result<()> {
    let mut local_stats = stats::LocalStats::new();
    let start = std::time::Instant::now();

    let file = File::open(pcap_path)
        .with_context(|| format!("opening {}", pcap_path.display()))?;

    match PcapNGReader::new(65536, file) {
        Ok(mut reader) => {
            info!("Detected PCAPNG format");
            loop {
                match reader.next() {
                    Ok((offset, block)) => {
                        match block {
                            PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                                process::process_frame(
                                    CapturedFrame::from(&epb),
                                    tunneler,
                                    args.encap,
                                    &mut local_stats,
                                    stats,
                                    args.dump,
                                );
                            }
                            PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                                process::process_frame(
                                    CapturedFrame::from(&spb),
                                    tunneler,
                                    args.encap,
                                    &mut local_stats,
                                    stats,
                                    args.dump,
                                );
                            }
                            PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                                check_linktype(idb.linktype);
                            }
                            _ => {}
                        }
                        reader.consume(offset);
                    }
                    Err(PcapError::Eof) => break,
                    Err(PcapError::Incomplete(_)) => {
                        reader
                            .refill()
                            .map_err(|e| anyhow!("reading PCAPNG: {:?}", e))?;
                    }
                    Err(e) => return Err(anyhow!("reading PCAPNG: {:?}", e)),
                }
            }
        }
        Err(_) => {
            let file = File::open(pcap_path)
                .with_context(|| format!("opening {}", pcap_path.display()))?;
            let mut reader = LegacyPcapReader::new(65536, file)
                .map_err(|e| anyhow!("not a pcap or pcapng file: {:?}", e))?;

            loop {
                match reader.next() {
                    Ok((offset, block)) => {
                        match block {
                            PcapBlockOwned::Legacy(packet) => {
                                process::process_frame(
                                    CapturedFrame::from(&packet),
                                    tunneler,
                                    args.encap,
                                    &mut local_stats,
                                    stats,
                                    args.dump,
                                );
                            }
                            PcapBlockOwned::LegacyHeader(header) => {
                                check_linktype(header.network);
                            }
                            _ => {}
                        }
                        reader.consume(offset);
                    }
                    Err(PcapError::Eof) => break,
                    Err(PcapError::Incomplete(_)) => {
                        reader
                            .refill()
                            .map_err(|e| anyhow!("reading PCAP: {:?}", e))?;
                    }
                    Err(e) => return Err(anyhow!("reading PCAP: {:?}", e)),
                }
            }
        }
    }

    local_stats.flush(stats);

    info!(
        "Processed {} frames in {:.3}s",
        stats.total_packets.load(std::sync::atomic::Ordering::Relaxed),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

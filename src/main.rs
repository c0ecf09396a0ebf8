use clap::{ArgAction, Parser, Subcommand};
use hidblock::descriptor::{self, formats::StandardFormat};
use hidblock::effect::{self, EffectCodec, EffectFlags, EffectKind, EffectParameterBlock};
use hidblock::layout::{plan, Segment};
use hidblock::EffectCodecConfig;
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "hidblock", about = "Build and inspect native device-format and effect parameter blocks")]
struct Cli {
    /// Log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute segment offsets for a header followed by SIZExCOUNT segments
    Plan {
        #[arg(long)]
        header: usize,
        #[arg(required = true, num_args = 1..)]
        segments: Vec<String>,
    },
    /// Encode a predefined data format: mouse, mouse2, keyboard, joystick, joystick2
    Format {
        name: String,
        #[arg(short, long)]
        dump: bool,
    },
    /// Encode effect parameters from a JSON file and decode them back
    Effect {
        input: PathBuf,
        /// Effect kind: constant, ramp, periodic, condition, custom
        #[arg(short, long)]
        kind: Option<String>,
        #[arg(short, long)]
        dump: bool,
    },
    /// Pre-size an effect block for the native side to fill
    Empty {
        #[arg(short, long)]
        kind: String,
        #[arg(short, long, default_value = "0")]
        flags: u32,
        /// JSON codec configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Reserve this many axis slots instead of none
        #[arg(long)]
        axes: Option<usize>,
        #[arg(short, long)]
        dump: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("hidblock={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    match cli.command {

        // ── Plan ─────────────────────────────────────────────────────────────
        Commands::Plan { header, segments } => {
            let segments = segments.iter()
                .map(|s| parse_segment(s))
                .collect::<Result<Vec<_>, _>>()?;
            let p = plan(header, &segments)?;
            println!("{:<8} {:>10} {:>8} {:>10}", "Segment", "Elem size", "Count", "Offset");
            for (i, (seg, off)) in p.segments.iter().zip(&p.offsets).enumerate() {
                println!("{:<8} {:>10} {:>8} {:>10}", i, seg.element_size, seg.count, off);
            }
            println!("Total size: {} B", p.total_size);
        }

        // ── Format ───────────────────────────────────────────────────────────
        Commands::Format { name, dump } => {
            let format = StandardFormat::from_name(&name)
                .ok_or_else(|| format!("Unknown data format '{name}'"))?;
            let desc = format.descriptor();
            let block = descriptor::encode(&desc)?;
            println!("── Data format: {} ─────────────────────────────", format.name());
            println!("  Flags          {:?}", desc.flags());
            println!("  Report size    {} B", desc.report_size());
            println!("  Objects        {}", desc.objects().len());
            println!("  Identifiers    {}", desc.identifier_count());
            println!("  Block size     {} B", block.len());
            let decoded = descriptor::decode(&block.view())?;
            println!("  Round trip     {}", if decoded == desc { "ok" } else { "MISMATCH" });
            if dump {
                hex_dump(block.as_bytes());
            }
        }

        // ── Effect ───────────────────────────────────────────────────────────
        Commands::Effect { input, kind, dump } => {
            let params: EffectParameterBlock = serde_json::from_slice(&std::fs::read(&input)?)?;
            let kind = kind.as_deref().map(parse_kind).transpose()?;
            let kind = effect::resolve_kind(kind, params.type_specific.as_ref())?;
            let block = effect::encode(&params, kind)?;

            println!("── Effect parameters: {} ──────────────────────", input.display());
            println!("  Kind           {}", kind.map(EffectKind::name).unwrap_or("none"));
            println!("  Axes           {}", params.axes.len());
            println!("  Envelope       {}", params.envelope.is_some());
            println!("  Payload        {} B", params.type_specific.as_ref().map_or(0, |p| p.byte_size()));
            println!("  Block size     {} B", block.len());

            // Without a payload the kind only selects a shape that is never read.
            let decoded = effect::decode(&block.view(), kind.unwrap_or(EffectKind::ConstantForce))?;
            println!("  Round trip     {}", if decoded == params { "ok" } else { "MISMATCH" });
            if dump {
                hex_dump(block.as_bytes());
            }
            println!("{}", serde_json::to_string_pretty(&decoded)?);
        }

        // ── Empty ────────────────────────────────────────────────────────────
        Commands::Empty { kind, flags, config, axes, dump } => {
            let kind = parse_kind(&kind)?;
            let config = match config {
                Some(path) => EffectCodecConfig::from_json_file(path)?,
                None       => EffectCodecConfig::default(),
            };
            let codec = EffectCodec::new(config);
            let flags = EffectFlags::from_bits_retain(flags);
            let block = match axes {
                Some(n) => codec.allocate_for_axes(flags, kind, n)?,
                None    => codec.allocate_empty(flags, kind)?,
            };
            let decoded = effect::decode(&block.view(), kind)?;
            println!("── Empty {} block ─────────────────────────────", kind.name());
            println!("  Axis slots     {}", decoded.axes.len());
            println!("  Payload        {} B", decoded.type_specific.as_ref().map_or(0, |p| p.byte_size()));
            println!("  Block size     {} B", block.len());
            if dump {
                hex_dump(block.as_bytes());
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn parse_segment(s: &str) -> Result<Segment, String> {
    let (size, count) = s.split_once(['x', 'X'])
        .ok_or_else(|| format!("Segment '{s}' is not SIZExCOUNT"))?;
    let size = size.trim().parse::<usize>().map_err(|e| format!("Segment '{s}': {e}"))?;
    let count = count.trim().parse::<i64>().map_err(|e| format!("Segment '{s}': {e}"))?;
    Segment::from_signed(size, count).map_err(|e| e.to_string())
}

fn parse_kind(s: &str) -> Result<EffectKind, String> {
    s.parse()
}

fn hex_dump(bytes: &[u8]) {
    for (i, line) in bytes.chunks(16).enumerate() {
        println!("  {:06x}  {}", i * 16, hex::encode(line));
    }
}

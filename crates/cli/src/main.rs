use clap::Parser;
use ingest::{Connection, IngestConfig, IngestError};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ts-ingest",
    about = "Receive an RTP/UDP multicast MPEG-TS stream and write it out"
)]
struct Args {
    /// Stream address, e.g. rtp://239.0.0.1:5004 or udp://@239.0.0.1:1234
    uri: String,

    /// Interface name or IPv4 address to join the group on
    #[arg(long, short)]
    interface: Option<String>,

    /// Output file, or "-" for stdout
    #[arg(long, short, default_value = "-")]
    output: PathBuf,

    /// Out-of-order RTP packets held before giving up on a gap
    #[arg(long, default_value_t = IngestConfig::default().reorder_depth)]
    reorder_depth: usize,

    /// Chunks buffered between the receiver and the writer
    #[arg(long, default_value_t = IngestConfig::default().queue_capacity)]
    queue_capacity: usize,

    /// Stop after this many seconds
    #[arg(long, short)]
    duration: Option<u64>,

    /// Seconds between stats log lines (0 disables)
    #[arg(long, default_value_t = 5)]
    stats_interval: u64,
}

fn open_output(path: &PathBuf) -> io::Result<Box<dyn Write>> {
    if path.as_os_str() == "-" {
        Ok(Box::new(BufWriter::new(io::stdout().lock())))
    } else {
        Ok(Box::new(BufWriter::new(File::create(path)?)))
    }
}

fn main() {
    // stdout may carry the stream, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = IngestConfig {
        interface: args.interface.clone(),
        reorder_depth: args.reorder_depth,
        queue_capacity: args.queue_capacity,
        ..IngestConfig::default()
    };

    let mut output = match open_output(&args.output) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Failed to open {}: {}", args.output.display(), e);
            return;
        }
    };

    let conn = match Connection::open_with_config(&args.uri, config) {
        Ok(conn) => Arc::new(conn),
        Err(e) => {
            eprintln!("Failed to open {}: {}", args.uri, e);
            return;
        }
    };

    eprintln!("Receiving {} on {}, press Enter to stop", conn.endpoint(), conn.local_addr());
    {
        let conn = conn.clone();
        thread::spawn(move || {
            let mut input = String::new();
            // EOF on stdin (e.g. a pipe) is not a stop request.
            if matches!(io::stdin().read_line(&mut input), Ok(n) if n > 0) {
                conn.close();
            }
        });
    }

    let started = Instant::now();
    let deadline = args.duration.map(|secs| started + Duration::from_secs(secs));
    let stats_every = (args.stats_interval > 0).then(|| Duration::from_secs(args.stats_interval));
    let mut last_stats = started;
    let mut buf = vec![0u8; 64 * 1024];
    let len = buf.len();

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }

        match conn.read(&mut buf, 0, len) {
            Ok(0) => {}
            Ok(n) => {
                if let Err(e) = output.write_all(&buf[..n]) {
                    tracing::error!(error = %e, "write failed");
                    break;
                }
            }
            Err(IngestError::Closed) => break,
            Err(e) => {
                tracing::error!(error = %e, "read failed");
                break;
            }
        }

        if let Some(every) = stats_every {
            if last_stats.elapsed() >= every {
                last_stats = Instant::now();
                let s = conn.stats();
                tracing::info!(
                    received = s.received,
                    lost = s.lost,
                    dropped = s.dropped,
                    malformed = s.malformed,
                    late = s.late,
                    stalls = s.stalls,
                    bytes = s.bytes_delivered,
                    queued = s.queue_depth,
                    "stats"
                );
            }
        }
    }

    if let Err(e) = output.flush() {
        tracing::error!(error = %e, "flush failed");
    }
    conn.close();
}

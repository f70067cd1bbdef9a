//! # CLI - RiptideTS Interactive Shell
//!
//! A REPL-style command-line interface over the in-memory write buffer.
//! Reads commands from stdin, executes them against a [`MemDb`], and prints
//! results to stdout. Designed for both interactive use and scripted testing
//! (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! WRITE series field family slot value [agg]   Buffer a sample (agg: sum|min|max|first|last)
//! SCAN series[,..] field[,..] [start end]      Scan buffered values
//! BYTES series field family                    Compact and dump the current window
//! RANGE series field family                    Slot range of the current window
//! FLUSH family                                 Export and drop a family
//! EVICT series                                 Drop a series
//! STATS                                        Print memdb debug info
//! EXIT / QUIT                                  Shut down
//! ```
//!
//! ## Configuration
//!
//! ```text
//! RIPTIDE_TIME_WINDOW    slots per block              (default: 60)
//! RIPTIDE_FLUSH_MB       memory threshold in MiB      (default: 64)
//! RIPTIDE_POOL_MAX_FREE  recycled blocks kept per type (default: 1024)
//! RUST_LOG               log filter                   (default: off)
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! RiptideTS memdb started (time_window=60, flush=64MiB, pool_max_free=1024)
//! > WRITE 1 1 0 3 10
//! OK (delta=1085, mem=1085)
//! > SCAN 1 1
//! series=1 field=1 family=0 slot=3 value=10
//! (1 values, 1 series)
//! > EXIT
//! bye
//! ```

mod commands;

use anyhow::Result;
use commands::Outcome;
use config::MemDbConfig;
use log::{info, warn};
use memdb::MemDb;
use std::io::{self, BufRead, Write};

fn main() -> Result<()> {
    env_logger::init();

    let config = MemDbConfig::from_env()?;
    let db = MemDb::new(config.clone())?;
    info!("memdb ready: {:?}", db);

    println!(
        "RiptideTS memdb started (time_window={}, flush={}MiB, pool_max_free={})",
        config.time_window,
        config.flush_threshold / (1024 * 1024),
        config.pool_max_free
    );
    println!("Commands: WRITE series field family slot value [agg] | SCAN series field [start end]");
    println!("          BYTES s f fam | RANGE s f fam | FLUSH family | EVICT series | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        match commands::execute(&db, &line) {
            Outcome::Continue(out) => {
                if !out.is_empty() {
                    println!("{}", out);
                }
            }
            Outcome::Exit(out) => {
                println!("{}", out);
                break;
            }
        }
        if db.is_full() {
            warn!(
                "memdb is full ({} bytes >= {}), flush a family",
                db.mem_size(),
                config.flush_threshold
            );
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}

#[macro_use]
extern crate log;

extern crate structopt;
use structopt::StructOpt;

extern crate simplelog;
use simplelog::{Config, LevelFilter, SimpleLogger};

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use pico_com_link::linux::SerialLink;
use pico_com_link::listing::{dir_view, EntryKind};
use pico_com_link::transfer::chunk_count;
use pico_com_link::{Link, Options};

#[derive(Clone, Debug, StructOpt)]
#[structopt(name = "pico-com-link", about = "File transfer and diagnostics over the RP2040 COM frame protocol")]
pub struct Args {
    /// Serial port to connect to
    #[structopt(long, default_value = "/dev/ttyACM0")]
    port: String,

    /// Serial port baud rate
    #[structopt(long, default_value = "115200")]
    baud: usize,

    #[structopt(flatten)]
    options: Options,

    /// Log level for console output
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, StructOpt)]
pub enum Command {
    /// List the immediate children of a device directory
    Ls {
        /// Device directory to list
        #[structopt(default_value = "/")]
        dir: String,
    },

    /// Print every node of the device tree
    Tree,

    /// Copy a local file onto the device
    Push {
        /// Local source file
        local: PathBuf,

        /// Destination directory on the device
        #[structopt(default_value = "/")]
        dir: String,
    },

    /// Copy a device file to the local filesystem
    Pull {
        /// Device source path
        remote: String,

        /// Local destination (defaults to the remote file name)
        local: Option<PathBuf>,
    },

    /// Delete a device file
    Rm { path: String },

    /// Create a device directory
    Mkdir { path: String },

    /// Delete a device directory including its content
    Rmdir { path: String },

    /// Fetch a display page
    Display {
        /// Page number, 255 is the currently shown page
        #[structopt(long, default_value = "255")]
        page: u32,

        /// Re-fetch every second
        #[structopt(long)]
        watch: bool,
    },

    /// List the dump-capable modules
    DumpList,

    /// Fetch a module dump
    Dump {
        /// Module name as reported by dump-list
        module: String,

        /// Re-fetch every second
        #[structopt(long)]
        watch: bool,
    },
}

fn chunk_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar().template("{bar:40} {pos}/{len} chunks ({elapsed})"),
    );
    bar
}

fn join_dir(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

fn main() -> Result<()> {
    let args = Args::from_args();

    let _ = SimpleLogger::init(args.log_level, Config::default());

    info!("Connecting to serial port {}", args.port);

    let mut link = Link::serial(&args.port, args.baud, args.options.clone())
        .map_err(|e| anyhow!("opening {}: {}", args.port, e))?;

    match args.command {
        Command::Ls { dir } => {
            let base = if dir.ends_with('/') {
                dir
            } else {
                format!("{}/", dir)
            };
            let entries = link.list_tree()?;
            for entry in dir_view(&base, &entries) {
                match entry.kind {
                    EntryKind::Directory => println!("{:>10}  {}", "dir", entry.path),
                    EntryKind::File => {
                        let size = entry
                            .size
                            .map(bytefmt::format)
                            .unwrap_or_else(|| "?".to_string());
                        println!("{:>10}  {}", size, entry.path);
                    }
                }
            }
        }

        Command::Tree => {
            for entry in link.list_tree()? {
                match entry.size {
                    Some(size) => println!("{:>10}  {}", size, entry.path),
                    None => println!("{:>10}  {}", "", entry.path),
                }
            }
        }

        Command::Push { local, dir } => {
            let data = fs::read(&local)
                .with_context(|| format!("reading {}", local.display()))?;
            let name = local
                .file_name()
                .context("source path has no file name")?
                .to_string_lossy()
                .into_owned();
            let dest = join_dir(&dir, &name);

            info!("Uploading {} bytes to {}", data.len(), dest);

            let bar = chunk_bar(chunk_count(data.len()) as u64);
            link.upload(&dest, data, |i, _n| bar.set_position(i as u64))?;
            bar.finish();

            info!("Upload complete");
        }

        Command::Pull { remote, local } => {
            let dest = local.unwrap_or_else(|| {
                PathBuf::from(remote.rsplit('/').next().unwrap_or(&remote))
            });

            let bar = chunk_bar(0);
            let data = link.download(&remote, |i, n| {
                bar.set_length(n as u64);
                bar.set_position(i as u64);
            })?;
            bar.finish();

            fs::write(&dest, &data)
                .with_context(|| format!("writing {}", dest.display()))?;
            info!("Wrote {} bytes to {}", data.len(), dest.display());
        }

        Command::Rm { path } => link.remove_file(&path)?,

        Command::Mkdir { path } => link.make_dir(&path)?,

        Command::Rmdir { path } => link.remove_dir(&path)?,

        Command::Display { page, watch } => loop {
            let display = link.display_read(page)?;
            println!("--- display page {} ---", display.page);
            println!("{}", display.info.trim());
            println!("{}", display.content);

            if !watch {
                break;
            }
            thread::sleep(Duration::from_secs(1));
        },

        Command::DumpList => {
            for module in link.dump_list()? {
                println!("{}", module);
            }
        }

        Command::Dump { module, watch } => loop {
            println!("{}", link.dump(&module)?);

            if !watch {
                break;
            }
            thread::sleep(Duration::from_secs(1));
        },
    }

    Ok(())
}

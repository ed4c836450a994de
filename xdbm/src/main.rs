use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xdbm::comparator::{CaseIgnoreString, NaturalOrder};
use xdbm::config::StoreConfig;
use xdbm::cursor::Cursor;
use xdbm::storage::{RecordManager, SharedRecordManager, StoreError};
use xdbm::table::Table;

const USAGE: &str = "usage:
  xdbm add <file> <table> <key> <value>
  xdbm drop <file> <table> <key> <value>
  xdbm get <file> <table> <key>
  xdbm scan <file> <table>
  xdbm count <file> <table>
  xdbm recover <file>";

/// One maintenance command, parsed from the command line.
#[derive(Debug)]
enum Command {
    Add { file: String, table: String, key: String, value: String },
    Drop { file: String, table: String, key: String, value: String },
    Get { file: String, table: String, key: String },
    Scan { file: String, table: String },
    Count { file: String, table: String },
    Recover { file: String },
}

impl Command {
    fn parse(args: &[String]) -> Option<Self> {
        let owned = |s: &String| s.to_string();
        match args {
            [cmd, file, table, key, value] if cmd == "add" => Some(Self::Add {
                file: owned(file),
                table: owned(table),
                key: owned(key),
                value: owned(value),
            }),
            [cmd, file, table, key, value] if cmd == "drop" => Some(Self::Drop {
                file: owned(file),
                table: owned(table),
                key: owned(key),
                value: owned(value),
            }),
            [cmd, file, table, key] if cmd == "get" => Some(Self::Get {
                file: owned(file),
                table: owned(table),
                key: owned(key),
            }),
            [cmd, file, table] if cmd == "scan" => Some(Self::Scan {
                file: owned(file),
                table: owned(table),
            }),
            [cmd, file, table] if cmd == "count" => Some(Self::Count {
                file: owned(file),
                table: owned(table),
            }),
            [cmd, file] if cmd == "recover" => Some(Self::Recover { file: owned(file) }),
            _ => None,
        }
    }

    fn file(&self) -> &str {
        match self {
            Self::Add { file, .. }
            | Self::Drop { file, .. }
            | Self::Get { file, .. }
            | Self::Scan { file, .. }
            | Self::Count { file, .. }
            | Self::Recover { file } => file,
        }
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xdbm=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = Command::parse(&args) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config = match StoreConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&command, &config) {
        tracing::error!("{} failed: {e}", command.file());
        std::process::exit(1);
    }
}

fn store_path(config: &StoreConfig, file: &str) -> xdbm::Result<PathBuf> {
    std::fs::create_dir_all(&config.data_directory)
        .map_err(|e| xdbm::Error::Store(StoreError::Io(e)))?;
    Ok(config.data_directory.join(file))
}

fn open_table(
    recman: SharedRecordManager,
    name: &str,
    config: &StoreConfig,
) -> xdbm::Result<Table<String, String>> {
    Table::open_duplicates(
        recman,
        name,
        Arc::new(CaseIgnoreString),
        Arc::new(NaturalOrder),
        config,
    )
}

fn run(command: &Command, config: &StoreConfig) -> xdbm::Result<()> {
    let path = store_path(config, command.file())?;

    if matches!(command, Command::Recover { .. }) {
        let mut rm = RecordManager::open(&path, config)?;
        let recovery = rm.recovery().clone();
        println!(
            "replayed {} transaction(s), discarded {}, wrote {} page(s)",
            recovery.transactions_replayed,
            recovery.transactions_discarded,
            recovery.pages_written
        );
        println!("{} page(s), {} free", rm.total_pages(), rm.free_pages());
        for name in rm.root_names()? {
            println!("root {name}");
        }
        rm.close()?;
        return Ok(());
    }

    let recman = RecordManager::open_shared(&path, config)?;
    let result = match command {
        Command::Add { table, key, value, .. } => {
            let table = open_table(Arc::clone(&recman), table, config)?;
            let added = table.add(key.to_string(), value.to_string())?;
            if !added {
                println!("already present");
            }
            table.close()
        }
        Command::Drop { table, key, value, .. } => {
            let table = open_table(Arc::clone(&recman), table, config)?;
            if !table.drop(key, value)? {
                println!("not found");
            }
            table.close()
        }
        Command::Get { table, key, .. } => {
            let table = open_table(Arc::clone(&recman), table, config)?;
            let mut values = table.cursor_for(key)?;
            while values.next()? {
                println!("{}", values.get()?);
            }
            values.close()?;
            table.close()
        }
        Command::Scan { table, .. } => {
            let table = open_table(Arc::clone(&recman), table, config)?;
            let mut cursor = table.cursor()?;
            while cursor.next()? {
                let tuple = cursor.get()?;
                println!("{}\t{}", tuple.key, tuple.value);
            }
            cursor.close()?;
            table.close()
        }
        Command::Count { table, .. } => {
            let table = open_table(Arc::clone(&recman), table, config)?;
            println!("{}", table.count()?);
            table.close()
        }
        Command::Recover { .. } => Ok(()),
    };

    let closed = RecordManager::lock(&recman).and_then(|mut rm| rm.close());
    result?;
    closed?;
    Ok(())
}

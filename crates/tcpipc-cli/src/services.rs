//! Example services hosted by the CLI.

use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

use tcpipc_common::contract::BulkPayload;
use tcpipc_common::{remote_contract, Result, TcpipcError};
use tracing::debug;

remote_contract! {
    #[proxy(CalculatorProxy)]
    /// Integer arithmetic.
    pub trait Calculator {
        fn add(&mut self, a: i64, b: i64) -> i64;
        fn subtract(&mut self, a: i64, b: i64) -> i64;
        /// Integer division; dividing by zero is a fault.
        fn divide(&mut self, a: i64, b: i64) -> i64;
        /// Number of calls served so far.
        fn calls(&mut self) -> u64;
    }
}

#[derive(Debug, Default)]
pub struct BasicCalculator {
    calls: u64,
}

impl Calculator for BasicCalculator {
    fn add(&mut self, a: i64, b: i64) -> Result<i64> {
        self.calls += 1;
        a.checked_add(b)
            .ok_or_else(|| TcpipcError::remote(format!("{} + {} overflows", a, b)))
    }

    fn subtract(&mut self, a: i64, b: i64) -> Result<i64> {
        self.calls += 1;
        a.checked_sub(b)
            .ok_or_else(|| TcpipcError::remote(format!("{} - {} overflows", a, b)))
    }

    fn divide(&mut self, a: i64, b: i64) -> Result<i64> {
        self.calls += 1;
        if b == 0 {
            return Err(TcpipcError::remote("division by zero"));
        }
        a.checked_div(b)
            .ok_or_else(|| TcpipcError::remote(format!("{} / {} overflows", a, b)))
    }

    fn calls(&mut self) -> Result<u64> {
        Ok(self.calls)
    }
}

remote_contract! {
    #[proxy(FileTransferProxy)]
    /// Read-only access to the files of one directory.
    pub trait FileTransfer {
        /// Regular files in the shared directory, sorted by name.
        fn list_files(&mut self) -> Vec<String>;
        fn file_size(&mut self, name: String) -> u64;
        /// The whole file, streamed through the bulk sub-protocol.
        fn transfer_file(&mut self, name: String) -> BulkPayload;
    }
}

/// Shares the regular files directly inside `root`.
#[derive(Debug, Clone)]
pub struct DirectoryShare {
    root: PathBuf,
}

impl DirectoryShare {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(TcpipcError::Configuration(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `name` inside the share, refusing anything that is not a
    /// plain file name.
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(file)), None) => Ok(self.root.join(file)),
            _ => Err(TcpipcError::remote(format!(
                "'{}' is not a file name in the share",
                name
            ))),
        }
    }

    fn open(&self, name: &str) -> Result<File> {
        let path = self.resolve(name)?;
        if !path.is_file() {
            return Err(TcpipcError::remote(format!("'{}' is not a file in the share", name)));
        }
        File::open(&path).map_err(|e| TcpipcError::remote(format!("cannot open '{}': {}", name, e)))
    }
}

impl FileTransfer for DirectoryShare {
    fn list_files(&mut self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| TcpipcError::remote(format!("cannot list share: {}", e)))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TcpipcError::remote(e.to_string()))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if let (true, Some(name)) = (is_file, entry.file_name().to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn file_size(&mut self, name: String) -> Result<u64> {
        let file = self.open(&name)?;
        let metadata = file
            .metadata()
            .map_err(|e| TcpipcError::remote(format!("cannot stat '{}': {}", name, e)))?;
        Ok(metadata.len())
    }

    fn transfer_file(&mut self, name: String) -> Result<BulkPayload> {
        let file = self.open(&name)?;
        let payload = BulkPayload::from_file(file)
            .map_err(|e| TcpipcError::remote(format!("cannot read '{}': {}", name, e)))?;
        debug!("Transferring '{}' ({} bytes)", name, payload.len());
        Ok(payload)
    }
}

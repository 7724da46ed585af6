//! Handing the generated attestation over to the user.
//!
//! Each platform gets its own [`FileDelivery`] implementation; the caller
//! picks one and never branches on the platform itself.

use clap::ValueEnum;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const ATTESTATION_FILE_NAME: &str = "attestation-deplacement-derogatoire.pdf";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("no {0} directory on this system, pass --dir")]
    NoDirectory(&'static str),
    #[error("permission to write to {0:?} was not granted")]
    PermissionDenied(PathBuf),
    #[error("failed to write {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub trait FileDelivery {
    /// Write the document and return where it ended up
    fn deliver(&self, pdf: &[u8]) -> Result<PathBuf, DeliveryError>;
}

fn write_attestation(dir: &Path, pdf: &[u8]) -> Result<PathBuf, DeliveryError> {
    let path = dir.join(ATTESTATION_FILE_NAME);
    fs::write(&path, pdf).map_err(|source| DeliveryError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Saves into the user's documents directory, no permission needed
pub struct DocumentsDelivery {
    pub dir: PathBuf,
}

impl DocumentsDelivery {
    pub fn new(dir: Option<PathBuf>) -> Result<Self, DeliveryError> {
        let dir = dir
            .or_else(dirs::document_dir)
            .ok_or(DeliveryError::NoDirectory("documents"))?;
        Ok(Self { dir })
    }
}

impl FileDelivery for DocumentsDelivery {
    fn deliver(&self, pdf: &[u8]) -> Result<PathBuf, DeliveryError> {
        fs::create_dir_all(&self.dir).map_err(|source| DeliveryError::Write {
            path: self.dir.clone(),
            source,
        })?;
        write_attestation(&self.dir, pdf)
    }
}

/// Saves into the shared downloads directory once write access is granted
pub struct DownloadsDelivery {
    pub dir: PathBuf,
}

impl DownloadsDelivery {
    pub fn new(dir: Option<PathBuf>) -> Result<Self, DeliveryError> {
        let dir = dir
            .or_else(dirs::download_dir)
            .ok_or(DeliveryError::NoDirectory("downloads"))?;
        Ok(Self { dir })
    }

    fn request_write_permission(&self) -> Result<(), DeliveryError> {
        let writable = fs::metadata(&self.dir)
            .map(|m| m.is_dir() && !m.permissions().readonly())
            .unwrap_or(false);
        if writable {
            Ok(())
        } else {
            Err(DeliveryError::PermissionDenied(self.dir.clone()))
        }
    }
}

impl FileDelivery for DownloadsDelivery {
    fn deliver(&self, pdf: &[u8]) -> Result<PathBuf, DeliveryError> {
        self.request_write_permission()?;
        let path = write_attestation(&self.dir, pdf)?;
        info!("Attestation téléchargée dans le dossier Download.");
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeliveryTarget {
    /// Private documents directory
    Documents,
    /// Shared downloads directory, requires write access
    Downloads,
}

impl Default for DeliveryTarget {
    fn default() -> Self {
        if cfg!(any(target_os = "android", target_os = "linux", target_os = "windows")) {
            DeliveryTarget::Downloads
        } else {
            DeliveryTarget::Documents
        }
    }
}

/// Build the delivery for `target`, optionally overriding its directory
pub fn delivery_for(
    target: DeliveryTarget,
    dir: Option<PathBuf>,
) -> Result<Box<dyn FileDelivery>, DeliveryError> {
    Ok(match target {
        DeliveryTarget::Documents => Box::new(DocumentsDelivery::new(dir)?),
        DeliveryTarget::Downloads => Box::new(DownloadsDelivery::new(dir)?),
    })
}

/// Open `path` in the platform's default viewer
pub fn open_in_viewer(path: &Path) -> io::Result<()> {
    if !path.is_file() {
        return Err(io::Error::new(io::ErrorKind::NotFound, format!("{:?} does not exist", path)));
    }
    open::that(path)
}

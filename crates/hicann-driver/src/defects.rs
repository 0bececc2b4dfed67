//! File-backed defect tracking.
//!
//! Two resource kinds are persisted: per-wafer disabled HICANNs and
//! per-FPGA disabled highspeed links. Each resource lives in its own YAML
//! file under the store root, keyed by coordinate; a missing file is an
//! empty resource. Disabling is idempotent: the sets are ordered, so
//! disabling the same coordinate twice produces a byte-identical file.
//!
//! Every store runs against its own root directory; nothing here locks
//! files. Concurrent writers to the *same* resource file are not supported
//! (bring-up jobs target one HICANN each and FPGA/wafer files are only
//! appended to by them; see DESIGN.md).

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use hicann_chip::{FpgaGlobal, HicannOnWafer, HighspeedLinkOnDnc, Wafer};

use crate::error::{DriverError, Result};

/// Disabled HICANNs of one wafer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaferDefects {
    wafer: Wafer,
    disabled: BTreeSet<u16>,
}

impl WaferDefects {
    /// Empty resource for a wafer.
    pub fn new(wafer: Wafer) -> Self {
        Self {
            wafer,
            disabled: BTreeSet::new(),
        }
    }

    /// The wafer this resource tracks.
    pub fn wafer(&self) -> Wafer {
        self.wafer
    }

    /// Mark a HICANN as unusable. Returns false if it already was.
    pub fn disable(&mut self, hicann: HicannOnWafer) -> bool {
        self.disabled.insert(hicann.value())
    }

    /// Whether a HICANN is marked unusable.
    pub fn is_disabled(&self, hicann: HicannOnWafer) -> bool {
        self.disabled.contains(&hicann.value())
    }

    /// Disabled HICANNs in enumeration order.
    pub fn disabled(&self) -> impl Iterator<Item = HicannOnWafer> + '_ {
        self.disabled.iter().filter_map(|&h| HicannOnWafer::new(h))
    }
}

/// Disabled highspeed links of one FPGA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FpgaDefects {
    fpga: FpgaGlobal,
    disabled: BTreeSet<u8>,
}

impl FpgaDefects {
    /// Empty resource for an FPGA.
    pub fn new(fpga: FpgaGlobal) -> Self {
        Self {
            fpga,
            disabled: BTreeSet::new(),
        }
    }

    /// The FPGA this resource tracks.
    pub fn fpga(&self) -> FpgaGlobal {
        self.fpga
    }

    /// Mark a highspeed link as unusable. Returns false if it already was.
    pub fn disable(&mut self, link: HighspeedLinkOnDnc) -> bool {
        self.disabled.insert(link.value())
    }

    /// Whether a highspeed link is marked unusable.
    pub fn is_disabled(&self, link: HighspeedLinkOnDnc) -> bool {
        self.disabled.contains(&link.value())
    }

    /// Disabled links in enumeration order.
    pub fn disabled(&self) -> impl Iterator<Item = HighspeedLinkOnDnc> + '_ {
        self.disabled
            .iter()
            .filter_map(|&l| HighspeedLinkOnDnc::new(l))
    }
}

#[derive(Serialize, Deserialize)]
struct WaferDefectsFile {
    wafer: u16,
    disabled_hicanns: Vec<u16>,
}

#[derive(Serialize, Deserialize)]
struct FpgaDefectsFile {
    wafer: u16,
    fpga: u8,
    disabled_highspeed_links: Vec<u8>,
}

/// Directory of defect resource files.
#[derive(Debug, Clone)]
pub struct DefectStore {
    root: PathBuf,
}

impl DefectStore {
    /// Open a store rooted at the given directory. The directory is created
    /// on the first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the store holds no resource files yet.
    pub fn is_empty(&self) -> Result<bool> {
        match std::fs::read_dir(&self.root) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry?;
                    if entry.path().extension().is_some_and(|e| e == "yaml") {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    fn wafer_path(&self, wafer: Wafer) -> PathBuf {
        self.root.join(format!("wafer-w{}.yaml", wafer.value()))
    }

    fn fpga_path(&self, fpga: FpgaGlobal) -> PathBuf {
        self.root.join(format!(
            "fpga-w{}f{}.yaml",
            fpga.wafer.value(),
            fpga.fpga.value()
        ))
    }

    /// Load the wafer resource; a missing file is an empty resource.
    pub fn load_wafer(&self, wafer: Wafer) -> Result<WaferDefects> {
        let path = self.wafer_path(wafer);
        let mut defects = WaferDefects::new(wafer);
        let Some(text) = read_optional(&path)? else {
            return Ok(defects);
        };
        let file: WaferDefectsFile = serde_yaml::from_str(&text)?;
        if file.wafer != wafer.value() {
            return Err(store_error(&path, "file is keyed to a different wafer"));
        }
        for h in file.disabled_hicanns {
            let hicann = HicannOnWafer::new(h)
                .ok_or_else(|| store_error(&path, format!("bad hicann {h}")))?;
            defects.disable(hicann);
        }
        Ok(defects)
    }

    /// Load the FPGA resource; a missing file is an empty resource.
    pub fn load_fpga(&self, fpga: FpgaGlobal) -> Result<FpgaDefects> {
        let path = self.fpga_path(fpga);
        let mut defects = FpgaDefects::new(fpga);
        let Some(text) = read_optional(&path)? else {
            return Ok(defects);
        };
        let file: FpgaDefectsFile = serde_yaml::from_str(&text)?;
        if file.wafer != fpga.wafer.value() || file.fpga != fpga.fpga.value() {
            return Err(store_error(&path, "file is keyed to a different FPGA"));
        }
        for l in file.disabled_highspeed_links {
            let link = HighspeedLinkOnDnc::new(l)
                .ok_or_else(|| store_error(&path, format!("bad highspeed link {l}")))?;
            defects.disable(link);
        }
        Ok(defects)
    }

    /// Persist the wafer resource. Failure here is fatal to the caller;
    /// a bring-up decision must not be lost silently.
    pub fn save_wafer(&self, defects: &WaferDefects) -> Result<()> {
        let file = WaferDefectsFile {
            wafer: defects.wafer.value(),
            disabled_hicanns: defects.disabled.iter().copied().collect(),
        };
        self.write(&self.wafer_path(defects.wafer), &serde_yaml::to_string(&file)?)?;
        info!(
            "{}: saved wafer defects ({} disabled)",
            defects.wafer,
            defects.disabled.len()
        );
        Ok(())
    }

    /// Persist the FPGA resource. Failure here is fatal to the caller.
    pub fn save_fpga(&self, defects: &FpgaDefects) -> Result<()> {
        let file = FpgaDefectsFile {
            wafer: defects.fpga.wafer.value(),
            fpga: defects.fpga.fpga.value(),
            disabled_highspeed_links: defects.disabled.iter().copied().collect(),
        };
        self.write(&self.fpga_path(defects.fpga), &serde_yaml::to_string(&file)?)?;
        info!(
            "{}: saved FPGA defects ({} links disabled)",
            defects.fpga,
            defects.disabled.len()
        );
        Ok(())
    }

    fn write(&self, path: &Path, text: &str) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(path, text)?;
        debug!("wrote {}", path.display());
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn store_error(path: &Path, reason: impl fmt::Display) -> DriverError {
    DriverError::DefectStore {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hicann(h: u16) -> HicannOnWafer {
        HicannOnWafer::new(h).unwrap()
    }

    #[test]
    fn missing_files_are_empty_resources() {
        let dir = tempfile::tempdir().unwrap();
        let store = DefectStore::new(dir.path().join("does-not-exist"));
        let defects = store.load_wafer(Wafer::new(3)).unwrap();
        assert_eq!(defects.disabled().count(), 0);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn wafer_defects_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DefectStore::new(dir.path());
        let mut defects = store.load_wafer(Wafer::new(3)).unwrap();
        assert!(defects.disable(hicann(88)));
        assert!(defects.disable(hicann(12)));
        store.save_wafer(&defects).unwrap();

        let reloaded = store.load_wafer(Wafer::new(3)).unwrap();
        assert_eq!(reloaded, defects);
        assert!(reloaded.is_disabled(hicann(88)));
        assert!(!reloaded.is_disabled(hicann(89)));
        assert!(!store.is_empty().unwrap());
    }

    #[test]
    fn disabling_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = DefectStore::new(dir.path());

        let mut defects = store.load_wafer(Wafer::new(0)).unwrap();
        defects.disable(hicann(7));
        store.save_wafer(&defects).unwrap();
        let once = std::fs::read(dir.path().join("wafer-w0.yaml")).unwrap();

        let mut defects = store.load_wafer(Wafer::new(0)).unwrap();
        assert!(!defects.disable(hicann(7)));
        store.save_wafer(&defects).unwrap();
        let twice = std::fs::read(dir.path().join("wafer-w0.yaml")).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn fpga_defects_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DefectStore::new(dir.path());
        let fpga = hicann(88).fpga().global(Wafer::new(3));

        let mut defects = store.load_fpga(fpga).unwrap();
        defects.disable(hicann(88).highspeed_link());
        store.save_fpga(&defects).unwrap();

        let reloaded = store.load_fpga(fpga).unwrap();
        assert!(reloaded.is_disabled(hicann(88).highspeed_link()));
        assert_eq!(reloaded.disabled().count(), 1);
    }

    #[test]
    fn mismatched_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DefectStore::new(dir.path());
        let mut defects = store.load_wafer(Wafer::new(1)).unwrap();
        defects.disable(hicann(0));
        store.save_wafer(&defects).unwrap();

        std::fs::rename(
            dir.path().join("wafer-w1.yaml"),
            dir.path().join("wafer-w2.yaml"),
        )
        .unwrap();
        assert!(matches!(
            store.load_wafer(Wafer::new(2)),
            Err(DriverError::DefectStore { .. })
        ));
    }
}

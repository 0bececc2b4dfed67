//! In-memory model of one wafer and its open links.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use tracing::{debug, info};

use hicann_chip::{FpgaGlobal, FpgaOnWafer, HicannOnWafer, Wafer};

use crate::backend::{ChipLink, Connector};
use crate::data::{FpgaData, HicannData};
use crate::defects::DefectStore;
use crate::error::Result;
use crate::hwdb::HardwareDb;

/// Staged configuration of one wafer.
#[derive(Debug)]
pub struct WaferData {
    coord: Wafer,
    fpgas: BTreeMap<u8, FpgaData>,
}

impl WaferData {
    /// Create an empty wafer model.
    pub fn new(coord: Wafer) -> Self {
        Self {
            coord,
            fpgas: BTreeMap::new(),
        }
    }

    /// The wafer coordinate.
    pub fn coord(&self) -> Wafer {
        self.coord
    }

    /// Per-reticle state, allocating on first access.
    pub fn fpga_mut(&mut self, fpga: FpgaOnWafer) -> &mut FpgaData {
        self.fpgas.entry(fpga.value()).or_default()
    }

    /// Per-reticle state, if allocated.
    pub fn fpga(&self, fpga: FpgaOnWafer) -> Option<&FpgaData> {
        self.fpgas.get(&fpga.value())
    }

    /// Staged HICANN data, allocating the reticle and slot on first access.
    pub fn hicann_mut(&mut self, hicann: HicannOnWafer) -> &mut HicannData {
        self.fpga_mut(hicann.fpga()).hicann_mut(hicann.on_dnc())
    }

    /// Staged HICANN data, if allocated.
    pub fn hicann(&self, hicann: HicannOnWafer) -> Option<&HicannData> {
        self.fpga(hicann.fpga())
            .and_then(|fpga| fpga.hicann(hicann.on_dnc()))
    }

    /// Whether a HICANN has staged data.
    pub fn has(&self, hicann: HicannOnWafer) -> bool {
        self.hicann(hicann).is_some()
    }

    /// Allocated reticles in enumeration order.
    pub fn allocated_fpgas(&self) -> Vec<FpgaOnWafer> {
        self.fpgas
            .keys()
            .filter_map(|&f| FpgaOnWafer::new(f))
            .collect()
    }

    /// Allocated HICANNs in enumeration order.
    pub fn allocated_hicanns(&self) -> Vec<HicannOnWafer> {
        let mut hicanns = Vec::new();
        for (&f, fpga) in &self.fpgas {
            let Some(coord) = FpgaOnWafer::new(f) else {
                continue;
            };
            for slot in fpga.allocated() {
                hicanns.push(slot.on_wafer(coord.dnc()));
            }
        }
        hicanns
    }

    /// Apply persisted defects: disabled HICANNs become blacklisted,
    /// disabled highspeed links force the slow channel.
    ///
    /// A blacklisted HICANN is skipped entirely, whatever its link flags.
    pub fn apply_defects(&mut self, store: &DefectStore) -> Result<()> {
        let wafer = self.coord;
        let wafer_defects = store.load_wafer(wafer)?;
        for hicann in wafer_defects.disabled() {
            self.fpga_mut(hicann.fpga())
                .set_blacklisted(hicann.on_dnc(), true);
        }
        let fpgas = self.allocated_fpgas();
        for fpga in fpgas {
            let fpga_defects = store.load_fpga(fpga.global(wafer))?;
            for link in fpga_defects.disabled() {
                self.fpga_mut(fpga).set_highspeed(link.hicann(), false);
            }
        }
        info!(
            "{wafer}: applied defects ({} HICANNs blacklisted)",
            wafer_defects.disabled().count()
        );
        Ok(())
    }

    /// Reset all blacklist and highspeed flags to their defaults.
    pub fn drop_defects(&mut self) {
        use hicann_chip::HicannOnDnc;
        for fpga in self.fpgas.values_mut() {
            for slot in HicannOnDnc::iter_all() {
                fpga.set_blacklisted(slot, false);
                fpga.set_highspeed(slot, true);
            }
        }
    }

    /// Resolve addresses and open one link per allocated reticle.
    ///
    /// Fails with a not-found error for any allocated FPGA missing from the
    /// database. HICANN versions are refreshed from the database for every
    /// registered HICANN so revision quirks are applied during readback.
    pub fn connect(&mut self, db: &HardwareDb, connector: &dyn Connector) -> Result<WaferConnection> {
        let wafer = self.coord;
        let mut links = BTreeMap::new();
        for fpga in self.allocated_fpgas() {
            let global = fpga.global(wafer);
            let ip = db.get_fpga_ip(global)?;
            debug!("{global}: connecting to {ip}");
            let link = connector.open(global, ip)?;
            links.insert(fpga.value(), FpgaLink {
                fpga: global,
                ip,
                link,
            });
        }
        for hicann in self.allocated_hicanns() {
            let global = hicann.global(wafer);
            if db.has_hicann(global) {
                self.hicann_mut(hicann).version = db.get_hicann_version(global)?;
            }
        }
        info!("{wafer}: connected {} reticle(s)", links.len());
        Ok(WaferConnection { links })
    }
}

/// One open reticle link with its resolved address.
pub struct FpgaLink {
    /// The FPGA this link talks to.
    pub fpga: FpgaGlobal,
    /// Resolved control network address.
    pub ip: Ipv4Addr,
    /// The transport.
    pub link: Box<dyn ChipLink>,
}

/// Open links of a connected wafer.
pub struct WaferConnection {
    links: BTreeMap<u8, FpgaLink>,
}

impl WaferConnection {
    /// Open links in enumeration order.
    pub fn links_mut(&mut self) -> impl Iterator<Item = &mut FpgaLink> {
        self.links.values_mut()
    }

    /// Number of open links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether no links are open.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SimConnector;
    use crate::error::DriverError;
    use hicann_chip::SetupType;

    #[test]
    fn hicann_access_allocates_reticle() {
        let mut wafer = WaferData::new(Wafer::new(0));
        let hicann = HicannOnWafer::new(88).unwrap();
        wafer.hicann_mut(hicann).phase = 0;
        assert!(wafer.has(hicann));
        assert_eq!(wafer.allocated_fpgas(), vec![FpgaOnWafer::new(11).unwrap()]);
        assert_eq!(wafer.allocated_hicanns(), vec![hicann]);
    }

    #[test]
    fn connect_requires_registered_fpga() {
        let mut wafer = WaferData::new(Wafer::new(0));
        wafer.hicann_mut(HicannOnWafer::new(0).unwrap());

        let mut db = HardwareDb::new();
        db.add_wafer(Wafer::new(0), SetupType::FacetsWafer, None);

        let connector = SimConnector::new();
        assert!(matches!(
            wafer.connect(&db, &connector),
            Err(DriverError::FpgaNotFound { .. })
        ));
    }

    #[test]
    fn connect_refreshes_versions_from_database() {
        let wafer_c = Wafer::new(4);
        let hicann = HicannOnWafer::new(88).unwrap();
        let mut wafer = WaferData::new(wafer_c);
        wafer.hicann_mut(hicann);

        let mut db = HardwareDb::new();
        db.add_wafer(wafer_c, SetupType::CubeSetup, None);
        db.add_fpga(hicann.fpga().global(wafer_c), Ipv4Addr::new(192, 168, 4, 1), true)
            .unwrap();
        db.add_hicann(hicann.global(wafer_c), 2, "X").unwrap();

        let connector = SimConnector::new();
        let conn = wafer.connect(&db, &connector).unwrap();
        assert_eq!(conn.len(), 1);
        assert_eq!(wafer.hicann(hicann).unwrap().version, 2);
    }
}

//! YAML-backed hardware database.
//!
//! Maps logical coordinates to physical connection info: FPGA IPs, HICANN
//! revisions and labels, ADC wiring. The on-disk form is a YAML stream with
//! one document per wafer:
//!
//! ```yaml
//! ---
//! wafer: 4
//! setuptype: cubesetup
//! fpgas:
//!   - {fpga: 0, ip: 192.168.4.1}
//! hicanns:
//!   - {hicann: 88, version: 2, label: X}
//! adcs:
//!   - {fpga: 0, dnc_on_fpga: 0, analog: 0, adc: B201287, channel: 1, trigger: 0}
//! ```
//!
//! Registration is strict: adding an FPGA to an unknown wafer, a HICANN to
//! an unknown FPGA or an ADC to an unknown FPGA is a hard not-found error,
//! never a silent insert. Removing an FPGA cascades to every HICANN and ADC
//! that is reachable only through it.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use hicann_chip::{
    AnalogOnHicann, FpgaGlobal, FpgaOnWafer, HicannGlobal, HicannOnDnc, HicannOnWafer, SetupType,
    Wafer,
};

use crate::adc::{AdcConfig, AdcSerial, CalibrationMode};
use crate::error::{DriverError, Result};

/// Connection info of one FPGA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FpgaEntry {
    /// Control network address.
    pub ip: Ipv4Addr,
    /// Whether the reticle is wired for highspeed operation at all.
    pub highspeed: bool,
}

/// Properties of one HICANN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HicannEntry {
    /// Chip revision.
    pub version: u32,
    /// Free-form label (die position, bin, ...), empty if unset.
    pub label: String,
}

/// Wiring of one ADC board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdcEntry {
    /// Board serial.
    pub coord: AdcSerial,
    /// Input channel on the board.
    pub channel: u8,
    /// Trigger input on the board.
    pub trigger: u8,
    /// Remote access endpoint, if the board hangs off another host.
    pub remote: Option<(Ipv4Addr, u16)>,
}

/// All entries of one wafer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaferEntry {
    /// Kind of system the wafer is mounted in.
    pub setup_type: SetupType,
    /// MACU address, if the setup is managed by one.
    pub macu: Option<Ipv4Addr>,
    /// MACU software version.
    pub macu_version: Option<u32>,
    fpgas: BTreeMap<u8, FpgaEntry>,
    hicanns: BTreeMap<u16, HicannEntry>,
    adcs: BTreeMap<(u8, u8), AdcEntry>,
}

impl WaferEntry {
    fn new(setup_type: SetupType, macu: Option<Ipv4Addr>, macu_version: Option<u32>) -> Self {
        Self {
            setup_type,
            macu,
            macu_version,
            fpgas: BTreeMap::new(),
            hicanns: BTreeMap::new(),
            adcs: BTreeMap::new(),
        }
    }

    /// Registered FPGAs in enumeration order.
    pub fn fpgas(&self) -> impl Iterator<Item = (FpgaOnWafer, &FpgaEntry)> {
        self.fpgas
            .iter()
            .filter_map(|(&f, e)| FpgaOnWafer::new(f).map(|c| (c, e)))
    }

    /// Registered HICANNs in enumeration order.
    pub fn hicanns(&self) -> impl Iterator<Item = (HicannOnWafer, &HicannEntry)> {
        self.hicanns
            .iter()
            .filter_map(|(&h, e)| HicannOnWafer::new(h).map(|c| (c, e)))
    }
}

/// The hardware database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HardwareDb {
    wafers: BTreeMap<u16, WaferEntry>,
}

impl HardwareDb {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a database from a YAML file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut db = Self::new();
        db.load(path)?;
        Ok(db)
    }

    /// Insert a wafer. All entries of an existing wafer are replaced.
    pub fn add_wafer(&mut self, wafer: Wafer, setup_type: SetupType, macu: Option<Ipv4Addr>) {
        let macu_version = macu.map(|_| 1);
        self.wafers
            .insert(wafer.value(), WaferEntry::new(setup_type, macu, macu_version));
    }

    /// Insert an FPGA. The wafer must already be registered. An existing
    /// FPGA entry is replaced.
    pub fn add_fpga(&mut self, fpga: FpgaGlobal, ip: Ipv4Addr, highspeed: bool) -> Result<()> {
        let entry = self.wafer_entry_mut(fpga.wafer)?;
        entry
            .fpgas
            .insert(fpga.fpga.value(), FpgaEntry { ip, highspeed });
        Ok(())
    }

    /// Insert a HICANN. The FPGA serving it must already be registered.
    /// An existing HICANN entry is replaced.
    pub fn add_hicann(
        &mut self,
        hicann: HicannGlobal,
        version: u32,
        label: impl Into<String>,
    ) -> Result<()> {
        let fpga = hicann.fpga();
        let entry = self.wafer_entry_mut(hicann.wafer)?;
        if !entry.fpgas.contains_key(&fpga.fpga.value()) {
            return Err(DriverError::FpgaNotFound { fpga });
        }
        entry.hicanns.insert(
            hicann.hicann.value(),
            HicannEntry {
                version,
                label: label.into(),
            },
        );
        Ok(())
    }

    /// Insert an ADC, wired to one analog channel of a reticle. The FPGA
    /// must already be registered. An existing entry is replaced.
    pub fn add_adc(
        &mut self,
        fpga: FpgaGlobal,
        analog: AnalogOnHicann,
        coord: AdcSerial,
        channel: u8,
        trigger: u8,
        remote: Option<(Ipv4Addr, u16)>,
    ) -> Result<()> {
        let entry = self.wafer_entry_mut(fpga.wafer)?;
        if !entry.fpgas.contains_key(&fpga.fpga.value()) {
            return Err(DriverError::FpgaNotFound { fpga });
        }
        entry.adcs.insert(
            (fpga.fpga.dnc().value(), analog.value()),
            AdcEntry {
                coord,
                channel,
                trigger,
                remote,
            },
        );
        Ok(())
    }

    /// Set the MACU address of an already registered wafer.
    pub fn add_macu(&mut self, wafer: Wafer, macu: Ipv4Addr) -> Result<()> {
        let entry = self.wafer_entry_mut(wafer)?;
        entry.macu = Some(macu);
        entry.macu_version.get_or_insert(1);
        Ok(())
    }

    /// Remove an FPGA. Every HICANN whose only path is this FPGA and every
    /// ADC wired to its reticle is removed as well.
    pub fn remove_fpga(&mut self, fpga: FpgaGlobal) {
        if let Some(entry) = self.wafers.get_mut(&fpga.wafer.value()) {
            entry.fpgas.remove(&fpga.fpga.value());
            entry
                .hicanns
                .retain(|&h, _| HicannOnWafer::new(h).map(|c| c.fpga()) != Some(fpga.fpga));
            let dnc = fpga.fpga.dnc().value();
            entry.adcs.retain(|&(d, _), _| d != dnc);
        }
    }

    /// Remove a HICANN.
    pub fn remove_hicann(&mut self, hicann: HicannGlobal) {
        if let Some(entry) = self.wafers.get_mut(&hicann.wafer.value()) {
            entry.hicanns.remove(&hicann.hicann.value());
        }
    }

    /// Remove an ADC.
    pub fn remove_adc(&mut self, fpga: FpgaGlobal, analog: AnalogOnHicann) {
        if let Some(entry) = self.wafers.get_mut(&fpga.wafer.value()) {
            entry.adcs.remove(&(fpga.fpga.dnc().value(), analog.value()));
        }
    }

    /// Whether a wafer is registered.
    pub fn has_wafer(&self, wafer: Wafer) -> bool {
        self.wafers.contains_key(&wafer.value())
    }

    /// Whether an FPGA is registered.
    pub fn has_fpga(&self, fpga: FpgaGlobal) -> bool {
        self.wafers
            .get(&fpga.wafer.value())
            .is_some_and(|e| e.fpgas.contains_key(&fpga.fpga.value()))
    }

    /// Whether a HICANN is registered.
    pub fn has_hicann(&self, hicann: HicannGlobal) -> bool {
        self.wafers
            .get(&hicann.wafer.value())
            .is_some_and(|e| e.hicanns.contains_key(&hicann.hicann.value()))
    }

    /// Whether an ADC is registered for the reticle/channel pair.
    pub fn has_adc(&self, fpga: FpgaGlobal, analog: AnalogOnHicann) -> bool {
        self.wafers
            .get(&fpga.wafer.value())
            .is_some_and(|e| e.adcs.contains_key(&(fpga.fpga.dnc().value(), analog.value())))
    }

    /// Whether [`Self::get_adc_of_hicann`] would succeed.
    pub fn has_adc_of_hicann(&self, hicann: HicannGlobal, analog: AnalogOnHicann) -> bool {
        self.has_adc(hicann.fpga(), analog)
    }

    /// Control network address of an FPGA.
    pub fn get_fpga_ip(&self, fpga: FpgaGlobal) -> Result<Ipv4Addr> {
        self.fpga_entry(fpga).map(|e| e.ip)
    }

    /// Chip revision of a HICANN.
    pub fn get_hicann_version(&self, hicann: HicannGlobal) -> Result<u32> {
        self.hicann_entry(hicann).map(|e| e.version)
    }

    /// Label of a HICANN, empty if unset.
    pub fn get_hicann_label(&self, hicann: HicannGlobal) -> Result<String> {
        self.hicann_entry(hicann).map(|e| e.label.clone())
    }

    /// Setup type of a wafer.
    pub fn get_setup_type(&self, wafer: Wafer) -> Result<SetupType> {
        self.wafer_entry(wafer).map(|e| e.setup_type)
    }

    /// MACU address of a wafer, `0.0.0.0` if the setup has none.
    pub fn get_macu(&self, wafer: Wafer) -> Result<Ipv4Addr> {
        self.wafer_entry(wafer)
            .map(|e| e.macu.unwrap_or(Ipv4Addr::UNSPECIFIED))
    }

    /// ADC recording configuration for one analog channel of a HICANN.
    ///
    /// Fails with a not-found error when no ADC is registered for the
    /// HICANN's reticle; it never returns a default.
    pub fn get_adc_of_hicann(
        &self,
        hicann: HicannGlobal,
        analog: AnalogOnHicann,
    ) -> Result<AdcConfig> {
        let entry = self.wafer_entry(hicann.wafer)?;
        let key = (hicann.hicann.dnc().value(), analog.value());
        let adc = entry
            .adcs
            .get(&key)
            .ok_or(DriverError::AdcNotFound { hicann, analog })?;
        Ok(AdcConfig {
            coord: adc.coord.clone(),
            channel: adc.channel,
            trigger: adc.trigger,
            load_calibration: CalibrationMode::LoadCalibration,
            remote: adc.remote,
        })
    }

    /// Registered wafers in enumeration order.
    pub fn wafers(&self) -> impl Iterator<Item = (Wafer, &WaferEntry)> {
        self.wafers.iter().map(|(&w, e)| (Wafer::new(w), e))
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.wafers.clear();
    }

    /// Load entries from a YAML file, replacing the current content.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        self.load_str(&text)?;
        info!(
            "loaded hardware database from {} ({} wafers)",
            path.display(),
            self.wafers.len()
        );
        Ok(())
    }

    /// Load entries from a YAML string, replacing the current content.
    pub fn load_str(&mut self, text: &str) -> Result<()> {
        self.clear();
        if text.trim().is_empty() {
            return Ok(());
        }
        for doc in serde_yaml::Deserializer::from_str(text) {
            let raw = RawWaferDoc::deserialize(doc)?;
            self.insert_raw(raw)?;
        }
        Ok(())
    }

    /// Store the database in a YAML file.
    pub fn store(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_yaml()?)?;
        debug!("stored hardware database to {}", path.display());
        Ok(())
    }

    fn insert_raw(&mut self, raw: RawWaferDoc) -> Result<()> {
        let wafer = Wafer::new(raw.wafer);
        let setup_type: SetupType = raw
            .setuptype
            .parse()
            .map_err(|e| DriverError::invalid_database(format!("wafer {}: {e}", raw.wafer)))?;

        if setup_type == SetupType::BssWafer && (raw.macu.is_none() || raw.macuversion.is_none()) {
            return Err(DriverError::invalid_database(format!(
                "wafer {}: setup type {setup_type} requires macu and macuversion",
                raw.wafer
            )));
        }
        let macu = raw
            .macu
            .as_deref()
            .map(|s| {
                s.parse::<Ipv4Addr>().map_err(|_| {
                    DriverError::invalid_database(format!("wafer {}: bad macu {s:?}", raw.wafer))
                })
            })
            .transpose()?;

        self.wafers.insert(
            raw.wafer,
            WaferEntry::new(setup_type, macu, raw.macuversion),
        );

        for f in &raw.fpgas {
            let fpga = FpgaOnWafer::new(f.fpga).ok_or_else(|| {
                DriverError::invalid_database(format!("wafer {}: bad fpga {}", raw.wafer, f.fpga))
            })?;
            let ip = f.ip.parse::<Ipv4Addr>().map_err(|_| {
                DriverError::invalid_database(format!("fpga {}: bad ip {:?}", f.fpga, f.ip))
            })?;
            self.add_fpga(fpga.global(wafer), ip, f.highspeed.unwrap_or(true))?;
        }

        match raw.hicanns {
            // Shortcut notation: one version for every HICANN on every
            // registered FPGA of this wafer.
            Some(RawHicanns::Shortcut { version }) => {
                let fpgas: Vec<FpgaOnWafer> = self
                    .wafers
                    .get(&raw.wafer)
                    .into_iter()
                    .flat_map(|e| e.fpgas().map(|(f, _)| f).collect::<Vec<_>>())
                    .collect();
                for fpga in fpgas {
                    for slot in HicannOnDnc::iter_all() {
                        let hicann = slot.on_wafer(fpga.dnc()).global(wafer);
                        self.add_hicann(hicann, version, "")?;
                    }
                }
            }
            Some(RawHicanns::List(entries)) => {
                for h in entries {
                    let hicann = HicannOnWafer::new(h.hicann).ok_or_else(|| {
                        DriverError::invalid_database(format!(
                            "wafer {}: bad hicann {}",
                            raw.wafer, h.hicann
                        ))
                    })?;
                    self.add_hicann(hicann.global(wafer), h.version, h.label.unwrap_or_default())?;
                }
            }
            None => {}
        }

        for a in &raw.adcs {
            let fpga = FpgaOnWafer::new(a.fpga).ok_or_else(|| {
                DriverError::invalid_database(format!("adc on bad fpga {}", a.fpga))
            })?;
            if a.dnc_on_fpga != 0 {
                return Err(DriverError::invalid_database(format!(
                    "adc on fpga {}: dnc_on_fpga {} out of range",
                    a.fpga, a.dnc_on_fpga
                )));
            }
            let analog = AnalogOnHicann::new(a.analog).ok_or_else(|| {
                DriverError::invalid_database(format!("adc: bad analog channel {}", a.analog))
            })?;
            let remote = match (&a.remote_ip, a.remote_port) {
                (Some(ip), Some(port)) => {
                    let ip = ip.parse::<Ipv4Addr>().map_err(|_| {
                        DriverError::invalid_database(format!("adc: bad remote_ip {ip:?}"))
                    })?;
                    Some((ip, port))
                }
                (None, None) => None,
                _ => {
                    return Err(DriverError::invalid_database(
                        "adc: remote_ip and remote_port must be given together",
                    ))
                }
            };
            self.add_adc(
                fpga.global(wafer),
                analog,
                AdcSerial::new(a.adc.clone()),
                a.channel,
                a.trigger,
                remote,
            )?;
        }

        Ok(())
    }

    fn to_yaml(&self) -> Result<String> {
        let mut out = String::new();
        for (&wafer, entry) in &self.wafers {
            let raw = RawWaferDoc::from_entry(wafer, entry);
            out.push_str("---\n");
            out.push_str(&serde_yaml::to_string(&raw)?);
        }
        Ok(out)
    }

    fn wafer_entry(&self, wafer: Wafer) -> Result<&WaferEntry> {
        self.wafers
            .get(&wafer.value())
            .ok_or(DriverError::WaferNotFound { wafer })
    }

    fn wafer_entry_mut(&mut self, wafer: Wafer) -> Result<&mut WaferEntry> {
        self.wafers
            .get_mut(&wafer.value())
            .ok_or(DriverError::WaferNotFound { wafer })
    }

    fn fpga_entry(&self, fpga: FpgaGlobal) -> Result<&FpgaEntry> {
        self.wafer_entry(fpga.wafer)?
            .fpgas
            .get(&fpga.fpga.value())
            .ok_or(DriverError::FpgaNotFound { fpga })
    }

    fn hicann_entry(&self, hicann: HicannGlobal) -> Result<&HicannEntry> {
        self.wafer_entry(hicann.wafer)?
            .hicanns
            .get(&hicann.hicann.value())
            .ok_or(DriverError::HicannNotFound { hicann })
    }
}

impl fmt::Display for HardwareDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_yaml().map_err(|_| fmt::Error)?)
    }
}

// On-disk schema.

#[derive(Debug, Serialize, Deserialize)]
struct RawWaferDoc {
    wafer: u16,
    setuptype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    macu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    macuversion: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fpgas: Vec<RawFpga>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hicanns: Option<RawHicanns>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    adcs: Vec<RawAdc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawFpga {
    fpga: u8,
    ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    highspeed: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum RawHicanns {
    List(Vec<RawHicann>),
    Shortcut { version: u32 },
}

#[derive(Debug, Serialize, Deserialize)]
struct RawHicann {
    hicann: u16,
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawAdc {
    fpga: u8,
    dnc_on_fpga: u8,
    analog: u8,
    adc: String,
    channel: u8,
    trigger: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remote_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remote_port: Option<u16>,
}

impl RawWaferDoc {
    fn from_entry(wafer: u16, entry: &WaferEntry) -> Self {
        let fpgas = entry
            .fpgas
            .iter()
            .map(|(&f, e)| RawFpga {
                fpga: f,
                ip: e.ip.to_string(),
                highspeed: (!e.highspeed).then_some(false),
            })
            .collect();

        // Merge rule: when every slot of every registered FPGA carries the
        // same version and no label, emit the shortcut form.
        let full = entry.fpgas.len() * HicannOnDnc::COUNT;
        let uniform_version = entry
            .hicanns
            .values()
            .map(|h| h.version)
            .collect::<std::collections::BTreeSet<_>>();
        let all_unlabeled = entry.hicanns.values().all(|h| h.label.is_empty());
        let hicanns = if entry.hicanns.is_empty() {
            None
        } else if entry.hicanns.len() == full && uniform_version.len() == 1 && all_unlabeled {
            Some(RawHicanns::Shortcut {
                version: uniform_version.into_iter().next().unwrap_or_default(),
            })
        } else {
            Some(RawHicanns::List(
                entry
                    .hicanns
                    .iter()
                    .map(|(&h, e)| RawHicann {
                        hicann: h,
                        version: e.version,
                        label: (!e.label.is_empty()).then(|| e.label.clone()),
                    })
                    .collect(),
            ))
        };

        let adcs = entry
            .adcs
            .iter()
            .map(|(&(dnc, analog), a)| RawAdc {
                fpga: dnc,
                dnc_on_fpga: 0,
                analog,
                adc: a.coord.as_str().to_string(),
                channel: a.channel,
                trigger: a.trigger,
                remote_ip: a.remote.map(|(ip, _)| ip.to_string()),
                remote_port: a.remote.map(|(_, port)| port),
            })
            .collect();

        Self {
            wafer,
            setuptype: entry.setup_type.name().to_string(),
            macu: entry.macu.map(|ip| ip.to_string()),
            macuversion: entry.macu_version,
            fpgas,
            hicanns,
            adcs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fpga(wafer: u16, fpga: u8) -> FpgaGlobal {
        FpgaOnWafer::new(fpga).unwrap().global(Wafer::new(wafer))
    }

    fn hicann(wafer: u16, hicann: u16) -> HicannGlobal {
        HicannOnWafer::new(hicann).unwrap().global(Wafer::new(wafer))
    }

    fn analog(channel: u8) -> AnalogOnHicann {
        AnalogOnHicann::new(channel).unwrap()
    }

    #[test]
    fn add_to_unregistered_wafer_is_a_hard_error() {
        let mut db = HardwareDb::new();
        assert!(matches!(
            db.add_fpga(fpga(4, 0), Ipv4Addr::new(192, 168, 4, 1), true),
            Err(DriverError::WaferNotFound { .. })
        ));
        assert!(matches!(
            db.add_hicann(hicann(4, 88), 2, "X"),
            Err(DriverError::WaferNotFound { .. })
        ));

        db.add_wafer(Wafer::new(4), SetupType::CubeSetup, None);
        // Wafer is there now but the serving FPGA still is not.
        assert!(matches!(
            db.add_hicann(hicann(4, 88), 2, "X"),
            Err(DriverError::FpgaNotFound { .. })
        ));
        assert!(matches!(
            db.add_adc(
                fpga(4, 0),
                analog(0),
                AdcSerial::new("B201287"),
                1,
                0,
                None
            ),
            Err(DriverError::FpgaNotFound { .. })
        ));
    }

    #[test]
    fn adc_lookup_returns_exact_registration() {
        let mut db = HardwareDb::new();
        db.add_wafer(Wafer::new(4), SetupType::CubeSetup, None);
        db.add_fpga(fpga(4, 11), Ipv4Addr::new(192, 168, 4, 1), true)
            .unwrap();
        db.add_hicann(hicann(4, 88), 4, "").unwrap();
        db.add_adc(fpga(4, 11), analog(0), AdcSerial::new("B201287"), 1, 0, None)
            .unwrap();
        db.add_adc(fpga(4, 11), analog(1), AdcSerial::new("B201287"), 0, 0, None)
            .unwrap();

        let cfg = db.get_adc_of_hicann(hicann(4, 88), analog(0)).unwrap();
        assert_eq!(cfg.coord, AdcSerial::new("B201287"));
        assert_eq!(cfg.channel, 1);
        assert_eq!(cfg.trigger, 0);
        assert_eq!(cfg.load_calibration, CalibrationMode::LoadCalibration);

        let cfg = db.get_adc_of_hicann(hicann(4, 88), analog(1)).unwrap();
        assert_eq!(cfg.channel, 0);

        // Unregistered pair raises, never defaults.
        assert!(matches!(
            db.get_adc_of_hicann(hicann(4, 0), analog(0)),
            Err(DriverError::WaferNotFound { .. }) | Err(DriverError::AdcNotFound { .. })
        ));
        db.add_fpga(fpga(4, 0), Ipv4Addr::new(192, 168, 4, 2), true)
            .unwrap();
        assert!(matches!(
            db.get_adc_of_hicann(hicann(4, 0), analog(0)),
            Err(DriverError::AdcNotFound { .. })
        ));
    }

    #[test]
    fn remove_fpga_cascades_to_its_hicanns_only() {
        let mut db = HardwareDb::new();
        db.add_wafer(Wafer::new(4), SetupType::CubeSetup, None);
        db.add_fpga(fpga(4, 0), Ipv4Addr::new(192, 168, 4, 1), true)
            .unwrap();
        db.add_fpga(fpga(4, 11), Ipv4Addr::new(192, 168, 4, 4), true)
            .unwrap();
        // HICANNs 0..8 hang off FPGA 0, 88 off FPGA 11.
        db.add_hicann(hicann(4, 3), 4, "").unwrap();
        db.add_hicann(hicann(4, 88), 2, "X").unwrap();

        db.remove_fpga(fpga(4, 0));

        assert!(!db.has_fpga(fpga(4, 0)));
        assert!(db.has_fpga(fpga(4, 11)));
        assert!(!db.has_hicann(hicann(4, 3)));
        assert!(db.has_hicann(hicann(4, 88)));
    }

    #[test]
    fn fpga_ip_lookup() {
        let mut db = HardwareDb::new();
        db.add_wafer(Wafer::new(0), SetupType::FacetsWafer, None);
        db.add_fpga(fpga(0, 0), Ipv4Addr::new(10, 11, 12, 13), true)
            .unwrap();
        db.add_fpga(fpga(0, 1), Ipv4Addr::new(127, 127, 127, 127), true)
            .unwrap();

        assert_eq!(
            db.get_fpga_ip(fpga(0, 0)).unwrap(),
            Ipv4Addr::new(10, 11, 12, 13)
        );
        assert_eq!(
            db.get_fpga_ip(fpga(0, 1)).unwrap(),
            Ipv4Addr::new(127, 127, 127, 127)
        );
        assert!(matches!(
            db.get_fpga_ip(fpga(0, 2)),
            Err(DriverError::FpgaNotFound { .. })
        ));
    }

    #[test]
    fn hicann_entries_merge_into_shortcut_on_store() {
        let mut db = HardwareDb::new();
        let wafer = Wafer::new(20);
        db.add_wafer(wafer, SetupType::CubeSetup, None);
        for f in FpgaOnWafer::iter_all() {
            db.add_fpga(
                f.global(wafer),
                Ipv4Addr::new(192, 168, 20, f.value() + 1),
                true,
            )
            .unwrap();
        }
        for h in HicannOnWafer::iter_all() {
            db.add_hicann(h.global(wafer), 4, "").unwrap();
        }

        let yaml = db.to_string();
        assert_eq!(yaml.matches("hicann:").count(), 0);
        assert_eq!(yaml.matches("hicanns:").count(), 1);
        assert_eq!(yaml.matches("version: 4").count(), 1);
        assert_eq!(yaml.matches("fpga:").count(), 48);
    }

    #[test]
    fn macu_defaults_to_unspecified() {
        let mut db = HardwareDb::new();
        db.add_wafer(Wafer::new(6), SetupType::CubeSetup, None);
        db.add_wafer(
            Wafer::new(7),
            SetupType::BssWafer,
            Some(Ipv4Addr::new(192, 168, 6, 5)),
        );
        assert_eq!(db.get_macu(Wafer::new(6)).unwrap(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(
            db.get_macu(Wafer::new(7)).unwrap(),
            Ipv4Addr::new(192, 168, 6, 5)
        );
    }
}

//! Staged configuration apply.
//!
//! A [`Configurator`] decides what gets pushed; the [`configure`] driver
//! decides traversal: FPGA-level bring-up strictly before any HICANN-level
//! work on that reticle, blacklisted HICANNs skipped entirely, independent
//! reticles in parallel. HICANN-level work follows [`CONFIG_ORDER`], a
//! fixed, documented step list; configurators pick a subset of it rather
//! than overriding hooks.

use std::thread;

use tracing::{debug, info, warn};

use hicann_chip::HicannOnDnc;

use crate::backend::LinkMode;
use crate::data::{Block, FpgaData, HicannData};
use crate::error::{DriverError, Result};
use crate::wafer::{FpgaLink, WaferConnection, WaferData};

/// One named configuration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStep {
    /// Program the analog parameter storage (multiple passes, slow).
    FloatingGates,
    /// Current stimulus sources.
    FgStimulus,
    /// Synapse weights and decoders.
    SynapseArray,
    /// Denmem quads.
    NeuronQuads,
    /// Link phase.
    Phase,
    /// FPGA-HICANN link channels.
    GbitLink,
    /// Synapse switch matrices.
    SynapseSwitches,
    /// Crossbar switch matrices.
    CrossbarSwitches,
    /// L1 repeaters.
    Repeaters,
    /// Layer-1 merger tree.
    MergerTree,
    /// DNC merger line.
    DncMergers,
    /// Background event generators.
    BackgroundGenerators,
    /// Synapse drivers.
    SynapseDrivers,
    /// Global neuron configuration.
    NeuronConfig,
    /// Analog output multiplexers.
    AnalogReadout,
}

/// The fixed apply order. Floating gates go first (slowest, and every later
/// step depends on stable analog parameters); L1 routing is closed before
/// the drivers that listen on it; analog readout is switched last.
pub const CONFIG_ORDER: &[ConfigStep] = &[
    ConfigStep::FloatingGates,
    ConfigStep::FgStimulus,
    ConfigStep::SynapseArray,
    ConfigStep::NeuronQuads,
    ConfigStep::Phase,
    ConfigStep::GbitLink,
    ConfigStep::SynapseSwitches,
    ConfigStep::CrossbarSwitches,
    ConfigStep::Repeaters,
    ConfigStep::MergerTree,
    ConfigStep::DncMergers,
    ConfigStep::BackgroundGenerators,
    ConfigStep::SynapseDrivers,
    ConfigStep::NeuronConfig,
    ConfigStep::AnalogReadout,
];

impl ConfigStep {
    /// Blocks transferred by this step, in transfer order.
    pub fn blocks(self, data: &HicannData) -> Vec<Block> {
        use crate::data::Subsystem;
        match self {
            Self::FloatingGates => vec![data.block(Subsystem::FloatingGates)],
            Self::FgStimulus => vec![data.block(Subsystem::FgStimulus)],
            Self::SynapseArray => vec![
                data.block(Subsystem::SynapseWeights),
                data.block(Subsystem::SynapseDecoders),
            ],
            Self::NeuronQuads => vec![data.block(Subsystem::NeuronQuads)],
            Self::Phase => vec![data.block(Subsystem::Phase)],
            Self::GbitLink => vec![data.block(Subsystem::GbitLink)],
            Self::SynapseSwitches => vec![data.block(Subsystem::SynapseSwitches)],
            Self::CrossbarSwitches => vec![data.block(Subsystem::CrossbarSwitches)],
            Self::Repeaters => vec![data.block(Subsystem::Repeater)],
            Self::MergerTree => vec![data.block(Subsystem::MergerTree)],
            Self::DncMergers => vec![data.block(Subsystem::DncMerger)],
            Self::BackgroundGenerators => vec![data.block(Subsystem::BackgroundGenerators)],
            Self::SynapseDrivers => vec![data.block(Subsystem::SynapseDrivers)],
            Self::NeuronConfig => vec![data.block(Subsystem::NeuronConfig)],
            Self::AnalogReadout => vec![data.block(Subsystem::AnalogReadout)],
        }
    }
}

/// Capability interface invoked by [`configure`].
///
/// `config_fpga` runs once per reticle before any `config` call on that
/// reticle. Implementations must be shareable across the per-reticle
/// threads; mutable state goes behind interior mutability.
pub trait Configurator: Sync {
    /// FPGA-level work: reset and channel bring-up.
    fn config_fpga(&self, link: &mut FpgaLink, fpga: &FpgaData) -> Result<()>;

    /// HICANN-level work for one non-blacklisted slot.
    fn config(&self, link: &mut FpgaLink, slot: HicannOnDnc, data: &HicannData) -> Result<()>;
}

/// Reset, bring up every usable channel, push the staged configuration.
///
/// The default full cycle; restricted variants drop steps from
/// [`CONFIG_ORDER`] but never reorder them.
#[derive(Debug, Clone)]
pub struct HicannConfigurator {
    steps: Vec<ConfigStep>,
}

impl HicannConfigurator {
    /// Full reset-and-program cycle.
    pub fn new() -> Self {
        Self {
            steps: CONFIG_ORDER.to_vec(),
        }
    }

    /// Full cycle minus the floating-gate programming passes. Used when the
    /// analog parameters are known to be good and reprogramming them would
    /// dominate the runtime.
    pub fn without_floating_gates() -> Self {
        Self {
            steps: CONFIG_ORDER
                .iter()
                .copied()
                .filter(|&s| s != ConfigStep::FloatingGates && s != ConfigStep::FgStimulus)
                .collect(),
        }
    }

    /// The steps this configurator applies.
    pub fn steps(&self) -> &[ConfigStep] {
        &self.steps
    }
}

impl Default for HicannConfigurator {
    fn default() -> Self {
        Self::new()
    }
}

fn bring_up_reticle(link: &mut FpgaLink, fpga: &FpgaData) -> Result<()> {
    link.link.reset()?;
    for slot in fpga.allocated() {
        if fpga.blacklisted(slot) {
            debug!("{} slot {slot}: blacklisted, skipping bring-up", link.fpga);
            continue;
        }
        let mode = if fpga.highspeed(slot) {
            LinkMode::Highspeed
        } else {
            LinkMode::Jtag
        };
        link.link.bring_up(slot, mode)?;
    }
    Ok(())
}

impl Configurator for HicannConfigurator {
    fn config_fpga(&self, link: &mut FpgaLink, fpga: &FpgaData) -> Result<()> {
        debug!("{}: reset and bring-up", link.fpga);
        bring_up_reticle(link, fpga)
    }

    fn config(&self, link: &mut FpgaLink, slot: HicannOnDnc, data: &HicannData) -> Result<()> {
        info!("{} slot {slot}: configuring", link.fpga);
        for &step in &self.steps {
            for block in step.blocks(data) {
                link.link.write_block(slot, block)?;
            }
        }
        Ok(())
    }
}

/// Reset and bring-up only; leaves all chip state untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct JustResetConfigurator;

impl Configurator for JustResetConfigurator {
    fn config_fpga(&self, link: &mut FpgaLink, fpga: &FpgaData) -> Result<()> {
        debug!("{}: reset only", link.fpga);
        bring_up_reticle(link, fpga)
    }

    fn config(&self, _link: &mut FpgaLink, _slot: HicannOnDnc, _data: &HicannData) -> Result<()> {
        Ok(())
    }
}

/// Does nothing at all. Placeholder for flows that only need the traversal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopConfigurator;

impl Configurator for NopConfigurator {
    fn config_fpga(&self, _link: &mut FpgaLink, _fpga: &FpgaData) -> Result<()> {
        Ok(())
    }

    fn config(&self, _link: &mut FpgaLink, _slot: HicannOnDnc, _data: &HicannData) -> Result<()> {
        Ok(())
    }
}

/// Apply a configurator to every allocated, non-blacklisted HICANN.
///
/// Independent reticles run in parallel; within one reticle the order is
/// strict: `config_fpga`, then `config` per slot in enumeration order.
pub fn configure<C>(wafer: &WaferData, conn: &mut WaferConnection, configurator: &C) -> Result<()>
where
    C: Configurator + ?Sized,
{
    let results: Vec<Result<()>> = thread::scope(|scope| {
        let mut handles = Vec::new();
        for link in conn.links_mut() {
            let fpga_data = wafer.fpga(link.fpga.fpga);
            let handle = scope.spawn(move || -> Result<()> {
                let Some(fpga) = fpga_data else {
                    return Ok(());
                };
                configurator.config_fpga(link, fpga)?;
                for slot in fpga.allocated() {
                    if fpga.blacklisted(slot) {
                        debug!("{} slot {slot}: blacklisted, skipping", link.fpga);
                        continue;
                    }
                    if let Some(data) = fpga.hicann(slot) {
                        configurator.config(link, slot, data)?;
                    }
                }
                Ok(())
            });
            handles.push(handle);
        }
        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    Err(DriverError::transfer_failed("configuration thread panicked"))
                })
            })
            .collect()
    });

    let reticles = results.len();
    for result in results {
        if let Err(e) = result {
            warn!("configuration failed: {e}");
            return Err(e);
        }
    }
    info!("configured {reticles} reticle(s)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::sim::LinkEvent;
    use crate::backends::SimConnector;
    use crate::hwdb::HardwareDb;
    use hicann_chip::{FpgaOnWafer, HicannOnWafer, SetupType, Wafer};
    use std::net::Ipv4Addr;

    fn connected_wafer(
        hicanns: &[u16],
    ) -> (WaferData, crate::wafer::WaferConnection, SimConnector) {
        let wafer_c = Wafer::new(0);
        let mut wafer = WaferData::new(wafer_c);
        let mut db = HardwareDb::new();
        db.add_wafer(wafer_c, SetupType::FacetsWafer, None);
        for &h in hicanns {
            let hicann = HicannOnWafer::new(h).unwrap();
            wafer.hicann_mut(hicann);
            let fpga = hicann.fpga().global(wafer_c);
            if !db.has_fpga(fpga) {
                db.add_fpga(fpga, Ipv4Addr::new(192, 168, 0, fpga.fpga.value() + 1), true)
                    .unwrap();
            }
        }
        let connector = SimConnector::new();
        let conn = wafer.connect(&db, &connector).unwrap();
        (wafer, conn, connector)
    }

    #[test]
    fn fpga_work_precedes_hicann_work() {
        let (wafer, mut conn, connector) = connected_wafer(&[0, 1]);
        configure(&wafer, &mut conn, &HicannConfigurator::new()).unwrap();

        let fpga = FpgaOnWafer::new(0).unwrap().global(Wafer::new(0));
        let state = connector.state(fpga).unwrap();
        let state = state.lock().unwrap();
        let first_write = state
            .events
            .iter()
            .position(|e| matches!(e, LinkEvent::Write { .. }))
            .unwrap();
        assert_eq!(state.events[0], LinkEvent::Reset);
        assert!(state.events[..first_write]
            .iter()
            .any(|e| matches!(e, LinkEvent::BringUp { .. })));
    }

    #[test]
    fn blacklisted_hicanns_receive_nothing() {
        let (mut wafer, _, _) = connected_wafer(&[0, 1]);
        let blacklisted = HicannOnWafer::new(1).unwrap();
        wafer
            .fpga_mut(blacklisted.fpga())
            .set_blacklisted(blacklisted.on_dnc(), true);

        // Reconnect after mutating the model.
        let mut db = HardwareDb::new();
        db.add_wafer(Wafer::new(0), SetupType::FacetsWafer, None);
        db.add_fpga(
            FpgaOnWafer::new(0).unwrap().global(Wafer::new(0)),
            Ipv4Addr::new(192, 168, 0, 1),
            true,
        )
        .unwrap();
        let connector = SimConnector::new();
        let mut conn = wafer.connect(&db, &connector).unwrap();
        configure(&wafer, &mut conn, &HicannConfigurator::new()).unwrap();

        let fpga = FpgaOnWafer::new(0).unwrap().global(Wafer::new(0));
        let state = connector.state(fpga).unwrap();
        let state = state.lock().unwrap();
        assert!(state.events.iter().all(|e| !matches!(
            e,
            LinkEvent::Write { slot, .. } | LinkEvent::BringUp { slot, .. }
                if *slot == blacklisted.on_dnc()
        )));
        assert!(state
            .events
            .iter()
            .any(|e| matches!(e, LinkEvent::Write { slot, .. } if slot.value() == 0)));
    }

    #[test]
    fn jtag_mode_is_used_when_highspeed_is_off() {
        let (mut wafer, _, _) = connected_wafer(&[0]);
        let hicann = HicannOnWafer::new(0).unwrap();
        wafer
            .fpga_mut(hicann.fpga())
            .set_highspeed(hicann.on_dnc(), false);

        let mut db = HardwareDb::new();
        db.add_wafer(Wafer::new(0), SetupType::FacetsWafer, None);
        db.add_fpga(
            FpgaOnWafer::new(0).unwrap().global(Wafer::new(0)),
            Ipv4Addr::new(192, 168, 0, 1),
            true,
        )
        .unwrap();
        let connector = SimConnector::new();
        let mut conn = wafer.connect(&db, &connector).unwrap();
        configure(&wafer, &mut conn, &JustResetConfigurator).unwrap();

        let fpga = FpgaOnWafer::new(0).unwrap().global(Wafer::new(0));
        let state = connector.state(fpga).unwrap();
        let state = state.lock().unwrap();
        assert!(state.events.contains(&LinkEvent::BringUp {
            slot: hicann.on_dnc(),
            mode: crate::backend::LinkMode::Jtag,
        }));
    }

    #[test]
    fn without_floating_gates_skips_fg_steps() {
        let cfg = HicannConfigurator::without_floating_gates();
        assert!(!cfg.steps().contains(&ConfigStep::FloatingGates));
        assert!(!cfg.steps().contains(&ConfigStep::FgStimulus));
        assert!(cfg.steps().contains(&ConfigStep::SynapseArray));
    }

    #[test]
    fn bring_up_failure_aborts_configuration() {
        let wafer_c = Wafer::new(0);
        let hicann = HicannOnWafer::new(0).unwrap();
        let mut wafer = WaferData::new(wafer_c);
        wafer.hicann_mut(hicann);

        let mut db = HardwareDb::new();
        db.add_wafer(wafer_c, SetupType::FacetsWafer, None);
        let fpga = hicann.fpga().global(wafer_c);
        db.add_fpga(fpga, Ipv4Addr::new(192, 168, 0, 1), true).unwrap();

        let connector = SimConnector::new();
        connector.break_highspeed(fpga, hicann.on_dnc());
        let mut conn = wafer.connect(&db, &connector).unwrap();
        assert!(configure(&wafer, &mut conn, &HicannConfigurator::new()).is_err());
    }
}

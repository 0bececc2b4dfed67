//! End-to-end configure/verify runs against the simulated transport.

use std::net::Ipv4Addr;

use hicann_chip::{FpgaOnWafer, HicannOnWafer, SetupType, Wafer};
use hicann_driver::backends::sim::LinkEvent;
use hicann_driver::{
    configure, HardwareDb, HicannConfigurator, SimConnector, Subsystem, VerifyConfigurator,
    WaferData,
};

const WAFER: u16 = 3;

fn setup(hicanns: &[u16]) -> (WaferData, HardwareDb, SimConnector) {
    let wafer_c = Wafer::new(WAFER);
    let mut wafer = WaferData::new(wafer_c);
    let mut db = HardwareDb::new();
    db.add_wafer(wafer_c, SetupType::BssWafer, Some(Ipv4Addr::UNSPECIFIED));
    for &h in hicanns {
        let hicann = HicannOnWafer::new(h).unwrap();
        wafer.hicann_mut(hicann);
        let fpga = hicann.fpga().global(wafer_c);
        if !db.has_fpga(fpga) {
            db.add_fpga(fpga, Ipv4Addr::new(192, 168, 3, fpga.fpga.value() + 1), true)
                .unwrap();
        }
        db.add_hicann(hicann.global(wafer_c), 4, "").unwrap();
    }
    (wafer, db, SimConnector::new())
}

#[test]
fn clean_configuration_verifies_without_errors() {
    let (mut wafer, db, connector) = setup(&[88]);
    let mut conn = wafer.connect(&db, &connector).unwrap();
    configure(&wafer, &mut conn, &HicannConfigurator::new()).unwrap();

    let verify = VerifyConfigurator::new();
    configure(&wafer, &mut conn, &verify).unwrap();

    assert_eq!(verify.error_count(false), 0);
    assert_eq!(verify.error_count(true), 0);

    // Unreadable subsystems are reported, not counted.
    let results = verify.results();
    let unreadable: Vec<_> = results.iter().filter(|r| !r.readable).collect();
    assert_eq!(unreadable.len(), 2);
    assert!(unreadable
        .iter()
        .any(|r| r.subsystem == Subsystem::FloatingGates));
    assert!(unreadable.iter().any(|r| r.subsystem == Subsystem::GbitLink));
}

#[test]
fn verify_counts_exactly_the_diverged_weights() {
    let (mut wafer, db, connector) = setup(&[88]);
    let mut conn = wafer.connect(&db, &connector).unwrap();
    configure(&wafer, &mut conn, &HicannConfigurator::new()).unwrap();

    // Diverge the staged model from what the chip received. Rows 220..=227
    // belong to the rev-4 dead drivers and must stay untouched here.
    let hicann = HicannOnWafer::new(88).unwrap();
    let data = wafer.hicann_mut(hicann);
    let n = 17;
    for i in 0..n {
        data.synapses.set_weight(i, 3, 9);
    }

    let verify = VerifyConfigurator::new();
    configure(&wafer, &mut conn, &verify).unwrap();

    assert_eq!(verify.error_count(false), n);
    let weights = verify
        .results()
        .into_iter()
        .find(|r| r.subsystem == Subsystem::SynapseWeights)
        .unwrap();
    assert_eq!(weights.errors, n);
    assert!(weights.reliable);
}

#[test]
fn unreliable_subsystems_never_contribute_to_the_total() {
    let (mut wafer, db, connector) = setup(&[88]);
    let mut conn = wafer.connect(&db, &connector).unwrap();
    configure(&wafer, &mut conn, &HicannConfigurator::new()).unwrap();

    let hicann = HicannOnWafer::new(88).unwrap();
    let data = wafer.hicann_mut(hicann);
    data.neuron_quads[5] = 0xaa;
    data.neuron_quads[6] = 0xbb;

    let verify = VerifyConfigurator::new();
    configure(&wafer, &mut conn, &verify).unwrap();

    assert_eq!(verify.error_count(false), 0);
    assert_eq!(verify.error_count(true), 2);

    let quads = verify
        .results()
        .into_iter()
        .find(|r| r.subsystem == Subsystem::NeuronQuads)
        .unwrap();
    assert_eq!(quads.errors, 2);
    assert!(!quads.reliable);
    assert!(quads.readable);
}

#[test]
fn rev4_dead_rows_do_not_produce_phantom_errors() {
    let (mut wafer, db, connector) = setup(&[88]);
    let mut conn = wafer.connect(&db, &connector).unwrap();
    configure(&wafer, &mut conn, &HicannConfigurator::new()).unwrap();

    // Row 221 belongs to driver 110, dead on rev 4, reads as bogus data.
    let hicann = HicannOnWafer::new(88).unwrap();
    let data = wafer.hicann_mut(hicann);
    assert_eq!(data.version, 4);
    data.synapses.set_weight(221, 0, 5);
    data.synapse_drivers[111].enable = true;

    let verify = VerifyConfigurator::new();
    configure(&wafer, &mut conn, &verify).unwrap();
    assert_eq!(verify.error_count(false), 0);
}

#[test]
fn multiple_reticles_configure_and_verify_in_one_run() {
    // Three reticles: FPGAs 0, 11 and 18.
    let (mut wafer, db, connector) = setup(&[1, 88, 144, 145]);
    let mut conn = wafer.connect(&db, &connector).unwrap();
    assert_eq!(conn.len(), 3);
    configure(&wafer, &mut conn, &HicannConfigurator::new()).unwrap();

    let verify = VerifyConfigurator::new();
    configure(&wafer, &mut conn, &verify).unwrap();
    assert_eq!(verify.error_count(false), 0);

    // One result set per HICANN per subsystem in the readback order.
    assert_eq!(
        verify.results().len(),
        4 * hicann_driver::VERIFY_ORDER.len()
    );
}

#[test]
fn verify_never_touches_chip_state() {
    let (mut wafer, db, connector) = setup(&[88]);
    let mut conn = wafer.connect(&db, &connector).unwrap();
    configure(&wafer, &mut conn, &HicannConfigurator::new()).unwrap();

    let fpga = HicannOnWafer::new(88).unwrap().fpga().global(Wafer::new(WAFER));
    let events_before = {
        let state = connector.state(fpga).unwrap();
        let state = state.lock().unwrap();
        state.events.clone()
    };

    let verify = VerifyConfigurator::new();
    configure(&wafer, &mut conn, &verify).unwrap();

    let state = connector.state(fpga).unwrap();
    let state = state.lock().unwrap();
    assert_eq!(state.events, events_before);
    assert!(!state
        .events
        .iter()
        .skip(events_before.len())
        .any(|e| matches!(e, LinkEvent::Reset | LinkEvent::Write { .. })));
}

#[test]
fn results_accumulate_across_wafers_until_cleared() {
    let verify = VerifyConfigurator::new();

    for _ in 0..2 {
        let (mut wafer, db, connector) = setup(&[88]);
        let mut conn = wafer.connect(&db, &connector).unwrap();
        configure(&wafer, &mut conn, &HicannConfigurator::new()).unwrap();
        configure(&wafer, &mut conn, &verify).unwrap();
    }
    assert_eq!(
        verify.results().len(),
        2 * hicann_driver::VERIFY_ORDER.len()
    );

    verify.clear();
    assert!(verify.results().is_empty());
}

#[test]
fn fpga_level_work_is_ordered_before_hicann_writes_per_reticle() {
    let (mut wafer, db, connector) = setup(&[1, 88]);
    let mut conn = wafer.connect(&db, &connector).unwrap();
    configure(&wafer, &mut conn, &HicannConfigurator::new()).unwrap();

    for f in [0u8, 11] {
        let fpga = FpgaOnWafer::new(f).unwrap().global(Wafer::new(WAFER));
        let state = connector.state(fpga).unwrap();
        let state = state.lock().unwrap();
        let first_write = state
            .events
            .iter()
            .position(|e| matches!(e, LinkEvent::Write { .. }))
            .expect("configuration writes blocks");
        assert!(state.events[..first_write]
            .iter()
            .any(|e| matches!(e, LinkEvent::Reset)));
    }
}

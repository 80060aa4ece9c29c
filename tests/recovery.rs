use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use xorshift_recover::recovery::is_blink;
use xorshift_recover::simulate::{simulate_blinks, simulate_intervals};
use xorshift_recover::{RecoveryError, RecoverySettings, StateRecovery, Xorshift};

#[test]
fn blink_recovery_lands_on_last_blink() {
    let mut seed = StdRng::seed_from_u64(2024);
    let rec = StateRecovery::default();
    for _ in 0..3 {
        let start = Xorshift::from_words(seed.gen());
        let run = simulate_blinks(start, 40, 0, 12);
        let recovered = rec.recover_from_blinks(&run.observations, 0).unwrap();
        assert_eq!(recovered.state, run.last_blink_state);
        assert_eq!(recovered.distance, 0);
        let mut solved = recovered.state;
        solved.retreat(recovered.advances);
        assert_eq!(solved, run.first_blink_state);

        let mut next = recovered.state;
        let last = run.observations.last().unwrap();
        let r = next.next_u32();
        assert!(is_blink(r));
        assert_eq!(r & 1 == 1, last.double);
    }
}

#[test]
fn blink_recovery_with_actor() {
    let start = Xorshift::new(0x0BADC0DE, 0xFEEDFACE, 0x8BADF00D, 0x1337C0DE);
    let run = simulate_blinks(start, 48, 1, 4);
    let recovered = StateRecovery::default()
        .recover_from_blinks(&run.observations, 1)
        .unwrap();
    assert_eq!(recovered.state, run.last_blink_state);
    assert_eq!(recovered.distance, 0);
    let ticks: u64 = run.observations[1..].iter().map(|o| o.gap).sum();
    assert_eq!(recovered.advances, ticks * 2);
}

#[test]
fn wrong_actor_count_is_rejected() {
    let start = Xorshift::new(11, 22, 33, 44);
    let run = simulate_blinks(start, 40, 1, 0);
    let res = StateRecovery::default().recover_from_blinks(&run.observations, 0);
    assert!(matches!(
        res,
        Err(RecoveryError::RecoveryValidation { .. }) | Err(RecoveryError::MatrixSingular { .. })
    ));
}

#[test]
fn interval_recovery_reaches_final_state() {
    let settings = RecoverySettings::default();
    let start = Xorshift::new(0x01234567, 0x89ABCDEF, 0xFEDCBA98, 0x76543210);
    let run = simulate_intervals(start, 80, settings.latency_correction);
    let recovered = StateRecovery::new(settings)
        .recover_from_intervals(&run.intervals)
        .unwrap();
    assert_eq!(recovered.state, run.final_state);
    assert_eq!(recovered.advances, 80);
}

#[test]
fn interval_recovery_rejects_shifted_samples() {
    let settings = RecoverySettings::default();
    let start = Xorshift::new(0xCAFEBABE, 0xDEADBEEF, 0x600DF00D, 0x0DDBA11);
    let mut run = simulate_intervals(start, 80, settings.latency_correction);
    // one interval off by half a second after the solved window
    let last = run.intervals.len() - 1;
    run.intervals[last] += 0.5;
    let res = StateRecovery::new(settings).recover_from_intervals(&run.intervals);
    assert!(matches!(res, Err(RecoveryError::RecoveryValidation { .. })));
}

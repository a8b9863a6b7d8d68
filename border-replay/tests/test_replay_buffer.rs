use anyhow::Result;
use border_replay::{
    shape, ArrayBatch, ExperienceBufferBase, NstepReplayBuffer, NstepReplayBufferConfig,
    PerConfig, PrioritizedReplayBuffer, ReplayBufferBase, ReplayError, TransitionRecords,
};
use std::collections::HashSet;
use tempdir::TempDir;
use test_log::test;

shape!(ObsShape, [3]);
shape!(ActShape, [1]);
type ObsBatch = ArrayBatch<f32, ObsShape>;
type ActBatch = ArrayBatch<i64, ActShape>;

/// Transitions whose observation, action and reward all encode the step `t`.
fn steps(ts: std::ops::Range<usize>) -> TransitionRecords<ObsBatch, ActBatch> {
    let obs = ts
        .clone()
        .flat_map(|t| vec![t as f32, t as f32 * 10.0, -(t as f32)])
        .collect::<Vec<_>>();
    let act = ts.clone().map(|t| t as i64).collect::<Vec<_>>();
    let reward = ts.clone().map(|t| t as f32).collect::<Vec<_>>();
    let reset = ts.map(|t| t % 5 == 4).collect::<Vec<_>>();
    TransitionRecords::new(
        ObsBatch::from_vec(obs).unwrap(),
        ActBatch::from_vec(act).unwrap(),
        reward,
        reset,
    )
    .unwrap()
}

#[test]
fn test_nstep_windows_after_wrap() -> Result<()> {
    let config = NstepReplayBufferConfig::default()
        .capacity(10)
        .nstep(3)
        .seed(3);
    let mut buffer = NstepReplayBuffer::<ObsBatch, ActBatch>::new(&config)?;
    for t in 0..23 {
        buffer.push(steps(t..t + 1))?;
    }
    assert_eq!(buffer.size(), 10);
    assert_eq!(buffer.write_cursor(), 3);

    for _ in 0..20 {
        let batch = buffer.batch(5)?;
        for k in 0..batch.len() {
            // Slots hold steps 13..23; windows may not run past step 22
            let t = batch.obs.row(k)[0];
            assert!((13.0..=19.0).contains(&t));
            assert_eq!(batch.rewards(k), &[t, t + 1.0, t + 2.0][..]);
            assert_eq!(batch.next_obs.row(k)[0], t + 3.0);
            assert_eq!(batch.act.row(k)[0], t as i64);
        }
    }
    Ok(())
}

#[test]
fn test_resets_follow_window() -> Result<()> {
    let config = NstepReplayBufferConfig::default().capacity(20).nstep(4);
    let mut buffer = NstepReplayBuffer::<ObsBatch, ActBatch>::new(&config)?;
    buffer.push(steps(0..12))?;
    assert_eq!(buffer.num_resets(), 2);
    assert_eq!(buffer.sum_rewards(), (0..12).sum::<usize>() as f32);

    let batch = buffer.get(&[2])?;
    assert_eq!(batch.resets(0), &[false, false, true, false][..]);
    Ok(())
}

#[test]
fn test_rejected_push_keeps_buffer() -> Result<()> {
    let config = NstepReplayBufferConfig::default().capacity(8).nstep(1);
    let mut buffer = NstepReplayBuffer::<ObsBatch, ActBatch>::new(&config)?;
    buffer.push(steps(0..3))?;

    let records = steps(0..2);
    let err = buffer
        .add_batch(&records.obs, &records.act, &[1.0], &records.reset)
        .unwrap_err();
    assert!(matches!(err, ReplayError::ShapeMismatch(_)));
    assert_eq!(buffer.size(), 3);
    assert_eq!(buffer.write_cursor(), 3);
    Ok(())
}

#[test]
fn test_prioritized_prefers_high_priority() -> Result<()> {
    let config = NstepReplayBufferConfig::default()
        .capacity(8)
        .nstep(1)
        .seed(11)
        .per_config(Some(PerConfig::default().alpha(1.0)));
    let mut buffer = PrioritizedReplayBuffer::<ObsBatch, ActBatch>::new(&config)?;
    buffer.push(steps(0..8))?;
    assert!(buffer.base().is_full());

    // Slot 2 gets almost all of the mass
    let ixs = (0..8).collect::<Vec<_>>();
    let ps = ixs
        .iter()
        .map(|&ix| if ix == 2 { 100.0 } else { 0.01 })
        .collect::<Vec<_>>();
    buffer.update_priorities(&ixs, &ps)?;
    assert_eq!(buffer.max_priority(), 100.0);

    let mut n_hits = 0;
    for _ in 0..50 {
        let batch = buffer.sample(1)?;
        if batch.ix_sample.unwrap()[0] == 2 {
            n_hits += 1;
        }
    }
    assert!(n_hits >= 45);
    Ok(())
}

#[test]
fn test_prioritized_batch_covers_buffer() -> Result<()> {
    let config = NstepReplayBufferConfig::default()
        .capacity(8)
        .nstep(1)
        .per_config(Some(PerConfig::default()));
    let mut buffer = PrioritizedReplayBuffer::<ObsBatch, ActBatch>::new(&config)?;
    buffer.push(steps(0..8))?;

    // With equal priorities every stratum holds exactly one sampleable slot
    let batch = buffer.batch(7)?;
    let ixs = batch.ix_sample.unwrap().into_iter().collect::<HashSet<_>>();
    assert_eq!(ixs, (0..7).collect::<HashSet<_>>());
    let expected = (1f32 / 8.0).ln();
    for lp in batch.log_prob.unwrap() {
        assert!((lp - expected).abs() < 1e-5);
    }
    Ok(())
}

#[test]
fn test_config_file_builds_buffer() -> Result<()> {
    let config = NstepReplayBufferConfig::default()
        .capacity(32)
        .nstep(2)
        .init_size(10)
        .per_config(Some(PerConfig::default().alpha(0.7)));
    let dir = TempDir::new("border_replay")?;
    let path = dir.path().join("replay.yaml");
    config.save(&path)?;

    let loaded = NstepReplayBufferConfig::load(&path)?;
    let mut buffer = PrioritizedReplayBuffer::<ObsBatch, ActBatch>::build(&loaded)?;
    buffer.push(steps(0..9))?;
    assert!(!buffer.is_ready());
    buffer.push(steps(9..10))?;
    assert!(buffer.is_ready());
    assert_eq!(buffer.len(), 10);
    Ok(())
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::*;
use crate::{
    buffer::VisBuffer,
    selection::{ChannelSlice, SelectionError},
    synthetic::SyntheticDataset,
};

fn iter_with(config: VisIterConfig) -> VisIter {
    let source = SyntheticDataset::default().build().unwrap();
    VisIter::new(source, config).unwrap()
}

/// Visit every sub-chunk, returning the positions seen.
fn walk(iter: &VisIter) -> Vec<ChunkPosition> {
    let mut seen = vec![];
    iter.origin_chunks().unwrap();
    while iter.more_chunks() {
        iter.origin();
        while iter.more() {
            seen.push(iter.position());
            iter.advance();
        }
        iter.next_chunk();
    }
    seen
}

#[test]
fn test_sub_chunks_share_timestamps() {
    let iter = iter_with(VisIterConfig::default());
    assert_eq!(iter.num_chunks(), 0);
    let seen = walk(&iter);
    assert_eq!(iter.num_chunks(), 1);
    let rows: Vec<_> = seen.iter().map(|p| p.rows.clone()).collect();
    assert_eq!(rows, vec![0..3, 3..6]);
    assert_eq!(seen[1].subchunk, 1);
}

#[test]
fn test_row_blocking() {
    let iter = iter_with(VisIterConfig {
        row_blocking: 4,
        ..Default::default()
    });
    let rows: Vec<_> = walk(&iter).into_iter().map(|p| p.rows).collect();
    // The last block is clamped to the end of the chunk.
    assert_eq!(rows, vec![0..4, 4..6]);

    iter.set_row_blocking(0);
    let rows: Vec<_> = walk(&iter).into_iter().map(|p| p.rows).collect();
    assert_eq!(rows, vec![0..3, 3..6]);
}

#[test]
fn test_chunk_interval() {
    let iter = iter_with(VisIterConfig {
        chunk_interval_s: 1.0,
        ..Default::default()
    });
    let seen = walk(&iter);
    assert_eq!(iter.num_chunks(), 2);
    assert_eq!(seen[1].chunk, 1);
    assert_eq!(seen[1].rows, 3..6);

    let source = SyntheticDataset::default().build().unwrap();
    assert!(matches!(
        VisIter::new(
            source,
            VisIterConfig {
                chunk_interval_s: -1.0,
                ..Default::default()
            }
        ),
        Err(VisIterError::BadChunkInterval(_))
    ));
}

#[test]
fn test_channel_groups() {
    let iter = iter_with(VisIterConfig::default());
    iter.select_channel_groups(&[2], &[0], &[1], &[2]).unwrap();
    iter.origin_chunks().unwrap();
    assert_eq!(iter.num_chan_groups(), 2);

    iter.origin();
    assert_eq!(iter.slicer().chans, Some(vec![0]));
    let mut groups = vec![];
    while iter.more_chunks() {
        iter.origin();
        while iter.more() {
            groups.push((iter.position().chan_group, iter.slicer().chans));
            iter.advance();
        }
        iter.next_chunk();
    }
    // Both sub-chunks of group 0 come before those of group 1.
    assert_eq!(
        groups,
        vec![
            (0, Some(vec![0])),
            (0, Some(vec![0])),
            (1, Some(vec![2])),
            (1, Some(vec![2])),
        ]
    );
}

#[test]
fn test_full_selection_has_no_slicer() {
    let iter = iter_with(VisIterConfig::default());
    let mut sel = ChannelSelection::default();
    sel.set_slices(
        0,
        vec![ChannelSlice {
            start: 0,
            width: 3,
            inc: 1,
        }],
    )
    .unwrap();
    iter.select_channels(sel).unwrap();
    iter.origin_chunks().unwrap();
    assert!(iter.slicer().is_full());

    let mut corrs = CorrSelection::default();
    corrs.set(0, vec![0, 3]).unwrap();
    iter.select_correlations(corrs).unwrap();
    let slicer = iter.slicer();
    assert_eq!(slicer.chans, None);
    assert_eq!(slicer.corrs, Some(vec![0, 3]));
}

#[test]
fn test_configuration_errors_are_eager() {
    let iter = iter_with(VisIterConfig::default());
    // One spectral window, but two entries.
    assert!(matches!(
        iter.select_channel_groups(&[1, 1], &[0, 0], &[1, 1], &[1, 1]),
        Err(VisIterError::Configuration(SelectionError::BadArrayShape { .. }))
    ));
    // Channel 3 doesn't exist.
    assert!(matches!(
        iter.select_channel_groups(&[2], &[0], &[2], &[2]),
        Err(VisIterError::Configuration(
            SelectionError::ChannelOutOfRange { chan: 3, .. }
        ))
    ));
    let mut corrs = CorrSelection::default();
    corrs.set(0, vec![4]).unwrap();
    assert!(matches!(
        iter.select_correlations(corrs),
        Err(VisIterError::Configuration(
            SelectionError::CorrelationOutOfRange { .. }
        ))
    ));
}

#[test]
fn test_advance_after_exhaustion_is_a_no_op() {
    let iter = iter_with(VisIterConfig::default());
    iter.origin_chunks().unwrap();
    iter.origin();
    iter.advance();
    iter.advance();
    assert!(!iter.more());
    let generation = iter.generation();
    let position = iter.position();
    iter.advance();
    assert_eq!(iter.generation(), generation);
    assert_eq!(iter.position(), position);
    assert!(iter.position().rows.is_empty());

    iter.next_chunk();
    assert!(!iter.more_chunks());
    let generation = iter.generation();
    iter.next_chunk();
    assert_eq!(iter.generation(), generation);
}

#[test]
fn test_every_move_bumps_the_generation() {
    let iter = iter_with(VisIterConfig::default());
    let mut last = iter.generation();
    let mut check = |iter: &VisIter| {
        assert!(iter.generation() > last);
        last = iter.generation();
    };
    iter.origin_chunks().unwrap();
    check(&iter);
    iter.origin();
    check(&iter);
    iter.advance();
    check(&iter);
    iter.next_chunk();
    check(&iter);
}

#[test]
fn test_lazy_state_after_chunk_move() {
    let iter = iter_with(VisIterConfig::default());
    iter.origin_chunks().unwrap();
    // No explicit origin(): the row range is worked out on demand.
    assert!(iter.more());
    assert_eq!(iter.rows(), 0..3);
    assert_eq!(iter.num_subchunks(), 2);
}

#[test]
fn test_position_display() {
    let position = ChunkPosition {
        chunk: 1,
        chan_group: 0,
        subchunk: 2,
        rows: 6..9,
    };
    assert_eq!(
        position.to_string(),
        "chunk 1, channel group 0, sub-chunk 2 (rows 6..9)"
    );
}

#[test]
fn test_parallactic_angles_are_cached_by_timestamp() {
    let iter = iter_with(VisIterConfig::default());
    iter.origin_chunks().unwrap();
    let mut state = iter.state().borrow_mut();
    let a = state.antenna_parallactic_angles(5.0e9, 0).unwrap();
    let b = state.antenna_parallactic_angles(5.0e9, 0).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 3);
    assert_eq!(state.pa_computations, 1);
    state.antenna_parallactic_angles(5.0e9 + 1.0, 0).unwrap();
    assert_eq!(state.pa_computations, 2);
    assert!(matches!(
        state.antenna_parallactic_angles(5.0e9, 1),
        Err(VisIterError::BadIndex {
            column: Column::FieldId,
            ..
        })
    ));
}

#[test]
fn test_obs_context_access() {
    let iter = iter_with(VisIterConfig::default());
    let mut vb = VisBuffer::attached(&iter);
    iter.origin_chunks().unwrap();
    iter.origin();
    let num_chans = iter.with_obs_context(|ctx| ctx.spectral_windows[0].num_chans());
    // Filling after the metadata closure has returned is fine.
    assert_eq!(vb.n_channel().unwrap(), num_chans);
}


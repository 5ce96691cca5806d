//! Task ordering plans.
//!
//! Each function takes the challenge's tasks (sorted by `order_num`) and returns
//! the `(task_id, new_order)` pairs that must change. Plans are applied through
//! `Database::renumber_tasks`, which keeps `(challenge_id, order_num)` unique
//! while rewriting.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::Task;

/// After a deletion: close the gap so orders are `1..=n` again.
pub fn compaction_plan(remaining: &[Task]) -> Vec<(i64, i64)> {
  remaining
    .iter()
    .enumerate()
    .filter_map(|(i, t)| {
      let want = i as i64 + 1;
      (t.order_num != want).then_some((t.id, want))
    })
    .collect()
}

/// Move `task_id` to `new_pos`. Tasks strictly between the old and new slot shift
/// by one towards the vacated slot; everything else stays. Empty when nothing moves.
pub fn move_plan(tasks: &[Task], task_id: i64, new_pos: i64) -> Vec<(i64, i64)> {
  let Some(moving) = tasks.iter().find(|t| t.id == task_id) else {
    return Vec::new();
  };
  let old = moving.order_num;
  if new_pos == old {
    return Vec::new();
  }

  let mut plan: Vec<(i64, i64)> = tasks
    .iter()
    .filter(|t| t.id != task_id)
    .filter_map(|t| {
      if new_pos < old && t.order_num >= new_pos && t.order_num < old {
        Some((t.id, t.order_num + 1))
      } else if new_pos > old && t.order_num > old && t.order_num <= new_pos {
        Some((t.id, t.order_num - 1))
      } else {
        None
      }
    })
    .collect();
  plan.push((task_id, new_pos));
  plan
}

/// Uniform random permutation of positions `1..=n` (Fisher-Yates).
pub fn shuffle_plan<R: Rng + ?Sized>(tasks: &[Task], rng: &mut R) -> Vec<(i64, i64)> {
  let mut positions: Vec<i64> = (1..=tasks.len() as i64).collect();
  positions.shuffle(rng);
  tasks
    .iter()
    .zip(positions)
    .filter(|(t, pos)| t.order_num != *pos)
    .map(|(t, pos)| (t.id, pos))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use proptest::prelude::*;
  use rand::{rngs::StdRng, SeedableRng};

  fn apply_plan(tasks: &mut [Task], plan: &[(i64, i64)]) {
    for (id, order) in plan {
      if let Some(t) = tasks.iter_mut().find(|t| t.id == *id) {
        t.order_num = *order;
      }
    }
    tasks.sort_by_key(|t| t.order_num);
  }

  fn tasks(n: i64) -> Vec<Task> {
    (1..=n)
      .map(|i| Task {
        id: i * 10,
        challenge_id: "CHAL0001".into(),
        order_num: i,
        title: format!("t{i}"),
        description: String::new(),
        image_file_id: String::new(),
        created_at: Utc::now(),
      })
      .collect()
  }

  fn ids(ts: &[Task]) -> Vec<i64> {
    ts.iter().map(|t| t.id).collect()
  }

  fn is_dense(ts: &[Task]) -> bool {
    ts.iter().enumerate().all(|(i, t)| t.order_num == i as i64 + 1)
  }

  #[test]
  fn move_up_to_front() {
    let mut ts = tasks(3);
    let plan = move_plan(&ts, 30, 1);
    apply_plan(&mut ts, &plan);
    assert_eq!(ids(&ts), vec![30, 10, 20]);
    assert!(is_dense(&ts));
  }

  #[test]
  fn move_down_only_touches_the_span() {
    let ts = tasks(5);
    let plan = move_plan(&ts, 20, 4);
    // 30 and 40 shift up; 10 and 50 are untouched
    assert_eq!(plan, vec![(30, 2), (40, 3), (20, 4)]);
  }

  #[test]
  fn move_to_same_slot_is_noop() {
    assert!(move_plan(&tasks(4), 20, 2).is_empty());
    assert!(move_plan(&tasks(4), 999, 1).is_empty());
  }

  #[test]
  fn compaction_after_middle_delete() {
    let mut ts = tasks(3);
    ts.remove(1);
    let plan = compaction_plan(&ts);
    assert_eq!(plan, vec![(30, 2)]);
    apply_plan(&mut ts, &plan);
    assert_eq!(ids(&ts), vec![10, 30]);
    assert!(is_dense(&ts));
  }

  #[test]
  fn shuffle_keeps_count_and_density() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut ts = tasks(20);
    let plan = shuffle_plan(&ts, &mut rng);
    apply_plan(&mut ts, &plan);
    assert_eq!(ts.len(), 20);
    assert!(is_dense(&ts));
  }

  proptest! {
    #[test]
    fn move_preserves_relative_order_of_others(n in 1i64..30, pick in 0usize..30, to in 1i64..30) {
      let n = n.max(1);
      let ts = tasks(n);
      let moving = ts[pick % n as usize].id;
      let to = (to - 1) % n + 1;

      let mut after = ts.clone();
      apply_plan(&mut after, &move_plan(&ts, moving, to));

      prop_assert!(is_dense(&after));
      prop_assert_eq!(after.iter().find(|t| t.id == moving).map(|t| t.order_num), Some(to));
      let others_before: Vec<i64> = ids(&ts).into_iter().filter(|id| *id != moving).collect();
      let others_after: Vec<i64> = ids(&after).into_iter().filter(|id| *id != moving).collect();
      prop_assert_eq!(others_before, others_after);
    }

    #[test]
    fn compaction_restores_density(n in 1i64..30, mask in proptest::collection::vec(any::<bool>(), 30)) {
      let mut ts: Vec<Task> = tasks(n).into_iter().enumerate().filter(|(i, _)| mask[*i]).map(|(_, t)| t).collect();
      let before = ids(&ts);
      let plan = compaction_plan(&ts);
      apply_plan(&mut ts, &plan);
      prop_assert!(is_dense(&ts));
      prop_assert_eq!(ids(&ts), before);
    }

    #[test]
    fn shuffle_is_a_permutation(n in 0i64..40, seed in any::<u64>()) {
      let mut rng = StdRng::seed_from_u64(seed);
      let mut ts = tasks(n);
      let plan = shuffle_plan(&ts, &mut rng);
      apply_plan(&mut ts, &plan);
      prop_assert_eq!(ts.len() as i64, n);
      prop_assert!(is_dense(&ts));
    }
  }
}

use grayline_store::{RunStep, StepName};

/// The pipeline's steps in order, each with the state a run is in while the
/// step executes.
static PLAN: [(RunStep, StepName); 2] = [
  (RunStep::CopyingImage, StepName::Copy),
  (RunStep::ConvertingGrayscale, StepName::Grayscale),
];

/// Steps still to run for a run whose persisted state is `current`.
///
/// The step matching `current` is included: it may have been interrupted.
pub(crate) fn remaining(current: RunStep) -> &'static [(RunStep, StepName)] {
  match current {
    RunStep::Starting | RunStep::CopyingImage => &PLAN,
    RunStep::ConvertingGrayscale => &PLAN[1..],
    RunStep::Completed | RunStep::Failed => &[],
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_plan_follows_legal_transitions() {
    let mut current = RunStep::Starting;
    for (state, _) in PLAN {
      assert!(current.can_transition_to(state));
      current = state;
    }
    assert!(current.can_transition_to(RunStep::Completed));
  }

  #[test]
  fn test_remaining_from_each_state() {
    assert_eq!(remaining(RunStep::Starting).len(), 2);
    assert_eq!(remaining(RunStep::CopyingImage)[0].1, StepName::Copy);
    assert_eq!(
      remaining(RunStep::ConvertingGrayscale),
      &[(RunStep::ConvertingGrayscale, StepName::Grayscale)]
    );
    assert!(remaining(RunStep::Completed).is_empty());
    assert!(remaining(RunStep::Failed).is_empty());
  }
}

use crate::core_modules::detection::Detection;
use std::collections::BTreeSet;

/// Outcome of classifying one frame's detections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub hazard_present: bool,
    /// Hazard labels seen above the threshold, sorted and de-duplicated.
    pub matched_labels: BTreeSet<String>,
}

/// Collapses a frame's detections into a single hazard flag.
///
/// A detection counts only when its label is in `hazard_labels` and its confidence
/// is strictly greater than `threshold`.
pub fn classify(
    detections: &[Detection],
    threshold: f32,
    hazard_labels: &BTreeSet<String>,
) -> Classification {
    let matched_labels: BTreeSet<String> = detections
        .iter()
        .filter(|d| d.confidence > threshold && hazard_labels.contains(&d.class_label))
        .map(|d| d.class_label.clone())
        .collect();

    Classification {
        hazard_present: !matched_labels.is_empty(),
        matched_labels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> BTreeSet<String> {
        ["Fire", "smoke"].into_iter().map(String::from).collect()
    }

    #[test]
    fn empty_detections_are_safe() {
        let result = classify(&[], 0.5, &labels());
        assert!(!result.hazard_present);
        assert!(result.matched_labels.is_empty());
    }

    #[test]
    fn threshold_is_strict() {
        let result = classify(&[Detection::new("Fire", 0.5)], 0.5, &labels());
        assert!(!result.hazard_present);

        let result = classify(&[Detection::new("Fire", 0.51)], 0.5, &labels());
        assert!(result.hazard_present);
    }

    #[test]
    fn only_hazard_labels_match() {
        let detections = vec![
            Detection::new("person", 0.99),
            Detection::new("smoke", 0.8),
            Detection::new("smoke", 0.7),
            Detection::new("fire", 0.9),
        ];
        let result = classify(&detections, 0.5, &labels());
        assert!(result.hazard_present);
        assert_eq!(
            result.matched_labels.into_iter().collect::<Vec<_>>(),
            vec!["smoke".to_string()]
        );
    }
}

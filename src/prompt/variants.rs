/// One of three fixed compositional templates cycled across a batch by the
/// global shot index. Keeping the cycle batch-wide (rather than per Look)
/// spreads visual variety over the whole result set.
#[derive(Debug, PartialEq, Eq)]
pub struct CompositionVariant {
    pub placement: &'static str,
    pub body_angle: &'static str,
    pub gaze: &'static str,
    pub negative_addition: &'static str,
}

static VARIANTS: [CompositionVariant; 3] = [
    CompositionVariant {
        placement: "Position the subject on the left third of the frame (rule of thirds), with open space on the right side",
        body_angle: "Body angled towards the right side of the frame, shoulders turned roughly 30 degrees away from square",
        gaze: "Eyes looking into the camera, head turned slightly back towards the lens",
        negative_addition: "subject dead-center in frame, perfectly symmetric composition, passport-photo framing",
    },
    CompositionVariant {
        placement: "Position the subject on the right third of the frame (rule of thirds), with open space on the left side",
        body_angle: "Body angled towards the left side of the frame, shoulders turned roughly 30 degrees away from square",
        gaze: "Eyes looking into the camera, chin turned slightly back over the near shoulder",
        negative_addition: "subject dead-center in frame, perfectly symmetric composition, passport-photo framing",
    },
    CompositionVariant {
        placement: "Position the subject just left of center for an asymmetric editorial composition, not dead-center",
        body_angle: "Body nearly square to the camera with one shoulder dropped slightly for a relaxed asymmetry",
        gaze: "Direct, confident eye contact with the camera",
        negative_addition: "perfectly centered symmetric framing, stiff frontal mugshot pose",
    },
];

/// Deterministic and side-effect-free: the same index always yields the same
/// template, and `variant_for_index(n) == variant_for_index(n + 3)`.
pub fn variant_for_index(global_index: usize) -> &'static CompositionVariant {
    &VARIANTS[global_index % 3]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_has_strict_period_three() {
        for n in 0..20 {
            assert_eq!(variant_for_index(n), variant_for_index(n + 3));
        }
    }

    #[test]
    fn consecutive_indices_select_distinct_templates() {
        assert_ne!(variant_for_index(0), variant_for_index(1));
        assert_ne!(variant_for_index(1), variant_for_index(2));
        assert_ne!(variant_for_index(0), variant_for_index(2));
    }

    #[test]
    fn every_template_bans_centered_framing() {
        for n in 0..3 {
            let negative = variant_for_index(n).negative_addition;
            assert!(negative.contains("center") || negative.contains("symmetric"));
        }
    }
}

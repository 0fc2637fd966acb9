use crate::detect::result::RawDetection;

/// Per-class non-maximum suppression.
///
/// Sorts by confidence (descending), then greedily suppresses any later box of
/// the same class whose IoU with a kept box exceeds `iou_threshold`. Output is
/// in descending confidence order, capped at `max_keep`.
pub fn non_max_suppression(
    mut candidates: Vec<RawDetection>,
    iou_threshold: f32,
    max_keep: usize,
) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut suppressed = vec![false; candidates.len()];
    let mut keep = Vec::with_capacity(max_keep.min(candidates.len()));

    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(i);
        if keep.len() == max_keep {
            break;
        }
        for j in (i + 1)..candidates.len() {
            if suppressed[j] || candidates[j].class_id != candidates[i].class_id {
                continue;
            }
            if candidates[i].bbox.iou(&candidates[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    let mut flags = vec![false; candidates.len()];
    for idx in keep {
        flags[idx] = true;
    }
    let mut flags = flags.into_iter();
    candidates.retain(|_| flags.next().unwrap_or(false));
    candidates
}

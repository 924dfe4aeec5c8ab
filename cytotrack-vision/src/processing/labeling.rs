//! Connected-component labeling of binary masks

use crate::error::FrameIssue;
use crate::frame::{LabelMap, Mask};
use crate::processing::segmentation::Segmenter;
use cytotrack_core::ThresholdPolicy;
use ndarray::{Array2, ArrayView2, ArrayView3};

/// Pixel adjacency used when growing components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// Horizontal and vertical neighbours
    Four,
    /// Horizontal, vertical and diagonal neighbours
    #[default]
    Eight,
}

fn find_root(parents: &mut [u32], label: u32) -> u32 {
    let mut current = label;
    while current != parents[current as usize] {
        // Path halving
        let grandparent = parents[parents[current as usize] as usize];
        parents[current as usize] = grandparent;
        current = grandparent;
    }
    current
}

fn union_labels(parents: &mut [u32], a: u32, b: u32) {
    let root_a = find_root(parents, a);
    let root_b = find_root(parents, b);
    // Smaller label stays the root so final labels follow raster order
    if root_a < root_b {
        parents[root_b as usize] = root_a;
    } else if root_b < root_a {
        parents[root_a as usize] = root_b;
    }
}

/// Label connected foreground components.
///
/// Background is 0; components are numbered 1..=n in the raster order of
/// their first pixel. Labels carry no meaning across frames.
pub fn label(mask: ArrayView2<'_, bool>, connectivity: Connectivity) -> LabelMap {
    let (height, width) = mask.dim();
    let mut labels: LabelMap = Array2::zeros((height, width));
    let mut parents: Vec<u32> = vec![0];

    for row in 0..height {
        for col in 0..width {
            if !mask[[row, col]] {
                continue;
            }

            // Already-visited neighbours: W, N, and for 8-connectivity NW and NE
            let mut neighbours = [0u32; 4];
            if col > 0 {
                neighbours[0] = labels[[row, col - 1]];
            }
            if row > 0 {
                neighbours[1] = labels[[row - 1, col]];
                if connectivity == Connectivity::Eight {
                    if col > 0 {
                        neighbours[2] = labels[[row - 1, col - 1]];
                    }
                    if col + 1 < width {
                        neighbours[3] = labels[[row - 1, col + 1]];
                    }
                }
            }

            match neighbours.iter().copied().filter(|&l| l > 0).min() {
                None => {
                    let new_label = parents.len() as u32;
                    parents.push(new_label);
                    labels[[row, col]] = new_label;
                }
                Some(min_label) => {
                    labels[[row, col]] = min_label;
                    for &neighbour in neighbours.iter().filter(|&&l| l > min_label) {
                        union_labels(&mut parents, min_label, neighbour);
                    }
                }
            }
        }
    }

    // Map provisional labels to consecutive final labels
    let mut relabel = vec![0u32; parents.len()];
    let mut next_label = 1;
    for provisional in 1..parents.len() as u32 {
        let root = find_root(&mut parents, provisional);
        if relabel[root as usize] == 0 {
            relabel[root as usize] = next_label;
            next_label += 1;
        }
        relabel[provisional as usize] = relabel[root as usize];
    }

    labels.mapv_inplace(|l| relabel[l as usize]);
    labels
}

/// Number of components in a label map
pub fn component_count(labels: ArrayView2<'_, u32>) -> usize {
    labels.iter().copied().max().unwrap_or(0) as usize
}

/// Label every mask of a video
pub fn label_masks(masks: &[Mask], connectivity: Connectivity) -> Vec<LabelMap> {
    masks.iter().map(|m| label(m.view(), connectivity)).collect()
}

/// Segmented and labeled video
#[derive(Debug, Clone, Default)]
pub struct LabeledVideo {
    pub labels: Vec<LabelMap>,
    pub issues: Vec<FrameIssue>,
}

/// Segment `video` under `policy` and label each frame with 8-connectivity
pub fn label_video(video: ArrayView3<'_, f64>, policy: ThresholdPolicy) -> LabeledVideo {
    let segmentation = Segmenter::new(policy).segment(video);
    LabeledVideo {
        labels: label_masks(&segmentation.masks, Connectivity::Eight),
        issues: segmentation.issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array3};

    fn mask_from(pattern: &[&[u8]]) -> Mask {
        let height = pattern.len();
        let width = pattern[0].len();
        Array2::from_shape_fn((height, width), |(r, c)| pattern[r][c] != 0)
    }

    fn assert_labels(labels: &LabelMap, expected: &[&[u32]]) {
        for (r, row) in expected.iter().enumerate() {
            for (c, &value) in row.iter().enumerate() {
                assert_eq!(labels[[r, c]], value, "mismatch at [{}, {}]", r, c);
            }
        }
    }

    #[test]
    fn test_label_empty_mask() {
        let mask = Array2::from_elem((5, 5), false);
        let labels = label(mask.view(), Connectivity::Eight);
        assert!(labels.iter().all(|&l| l == 0));
        assert_eq!(component_count(labels.view()), 0);
    }

    #[test]
    fn test_label_diagonal_connectivity() {
        let mask = mask_from(&[
            &[1, 0, 0],
            &[0, 1, 0],
            &[0, 0, 1],
        ]);
        let eight = label(mask.view(), Connectivity::Eight);
        assert_eq!(component_count(eight.view()), 1);

        let four = label(mask.view(), Connectivity::Four);
        assert_eq!(component_count(four.view()), 3);
    }

    #[test]
    fn test_label_u_shape_merges() {
        // Two arms discovered separately, joined on the last row
        let mask = mask_from(&[
            &[1, 0, 0, 1],
            &[1, 0, 0, 1],
            &[1, 1, 1, 1],
        ]);
        let labels = label(mask.view(), Connectivity::Eight);
        assert_labels(&labels, &[
            &[1, 0, 0, 1],
            &[1, 0, 0, 1],
            &[1, 1, 1, 1],
        ]);
    }

    #[test]
    fn test_label_anti_diagonal_ne_neighbour() {
        let mask = mask_from(&[
            &[0, 0, 1],
            &[0, 1, 0],
            &[1, 0, 0],
        ]);
        let labels = label(mask.view(), Connectivity::Eight);
        assert_eq!(component_count(labels.view()), 1);
    }

    #[test]
    fn test_label_raster_order() {
        let mask = mask_from(&[
            &[0, 0, 0, 1, 1],
            &[1, 0, 0, 0, 0],
            &[1, 0, 1, 0, 0],
        ]);
        let labels = label(mask.view(), Connectivity::Eight);
        assert_labels(&labels, &[
            &[0, 0, 0, 1, 1],
            &[2, 0, 0, 0, 0],
            &[2, 0, 3, 0, 0],
        ]);
    }

    #[test]
    fn test_label_video_counts_objects() {
        let mut video = Array3::from_elem((2, 20, 20), 0.0);
        video.slice_mut(s![0, 2..6, 2..6]).fill(1.0);
        video.slice_mut(s![0, 10..14, 10..14]).fill(1.0);
        video.slice_mut(s![1, 5..9, 5..9]).fill(1.0);

        let labeled = label_video(video.view(), ThresholdPolicy::PerFrame);
        assert_eq!(labeled.labels.len(), 2);
        assert_eq!(component_count(labeled.labels[0].view()), 2);
        assert_eq!(component_count(labeled.labels[1].view()), 1);
        assert!(labeled.issues.is_empty());
    }
}

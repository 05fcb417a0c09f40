use crate::layout::{RunLayout, SegmentName};
use crate::tile::Cluster;

/// One logical read sliced out of a cluster's cycle span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledRead {
    pub name: SegmentName,
    pub bases: Vec<u8>,
    pub quals: Vec<u8>,
}

/// Slice a cluster into its configured read segments, in layout order.
///
/// The layout was validated at construction, so a segment range falling
/// outside the cluster's span is a programming error, not a runtime one.
pub fn assemble_reads(cluster: &Cluster, layout: &RunLayout) -> Vec<AssembledRead> {
    layout
        .segments
        .iter()
        .map(|segment| {
            let range = (segment.first_cycle as usize - 1)..(segment.last_cycle as usize);
            debug_assert!(range.end <= cluster.bases.len());
            AssembledRead {
                name: segment.name,
                bases: cluster.bases[range.clone()].to_vec(),
                quals: cluster.quals[range].to_vec(),
            }
        })
        .collect()
}

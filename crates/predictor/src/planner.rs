//! Planning: partition a graph into kernels and derive their features.

use kernelmeter_ir::{
    verify_partition, FusionGrouper, FusionRuleDocument, Graph, GraphError, KernelGroup,
    RuleBasedGrouper,
};
use kernelmeter_kernels::{extract_features, KernelFeatures};
use std::fmt;
use std::sync::Arc;

pub struct PlannedKernel {
    pub group: KernelGroup,
    /// `None` for groups made only of zero-cost operators.
    pub features: Option<KernelFeatures>,
}

#[derive(Clone)]
pub struct KernelPlanner {
    grouper: Arc<dyn FusionGrouper>,
}

impl fmt::Debug for KernelPlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelPlanner")
            .field("grouper", &self.grouper.name())
            .finish()
    }
}

impl KernelPlanner {
    pub fn new(grouper: Arc<dyn FusionGrouper>) -> Self {
        Self { grouper }
    }

    pub fn rule_based(rules: FusionRuleDocument) -> Self {
        Self::new(Arc::new(RuleBasedGrouper::new(rules)))
    }

    /// Kernel groups in topological order. The partition is verified, so a
    /// custom grouper that drops or repeats nodes is rejected here.
    pub fn partition(&self, graph: &Graph) -> Result<Vec<KernelGroup>, GraphError> {
        let groups = self.grouper.group(graph)?;
        verify_partition(graph, &groups)?;
        Ok(groups)
    }

    pub fn plan(&self, graph: &Graph) -> Result<Vec<PlannedKernel>, GraphError> {
        self.partition(graph)?
            .into_iter()
            .map(|group| {
                let features = extract_features(graph, &group)?;
                Ok(PlannedKernel { group, features })
            })
            .collect()
    }
}

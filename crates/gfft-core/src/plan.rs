#![forbid(unsafe_code)]

//! Compiled plan trees.
//!
//! A [`Plan`] owns its root [`PlanNode`]; every node owns its children. The
//! tree is built once by the compiler and only read afterwards, so a plan can
//! be shared across threads and executed on several streams at once.

use gfft_device::{BufferRole, KernelArgs, Precision};
use serde::{Deserialize, Serialize};

use crate::registry::ResolvedKernel;
use crate::scheme::ComputeScheme;
use crate::transform::TransformSpec;
use crate::{Placement, TransformKind};

/// Leaf payload: the resolved kernel and its launch parameters.
#[derive(Debug, Clone)]
pub struct LeafStep {
    pub kernel: ResolvedKernel,
    pub args: KernelArgs,
}

#[derive(Debug, Clone)]
pub enum NodeBody {
    Leaf(LeafStep),
    /// Children in execution order.
    Composite(Vec<PlanNode>),
}

#[derive(Debug, Clone)]
pub struct PlanNode {
    pub scheme: ComputeScheme,
    /// Lengths this node is responsible for.
    pub lengths: Vec<usize>,
    /// Buffer read first; `None` when the node only transforms in place.
    pub src: Option<BufferRole>,
    /// Buffer holding the node's result.
    pub dst: BufferRole,
    /// Scratch this node and its subtree need, in complex elements.
    pub scratch_elements: usize,
    pub applies_normalization: bool,
    pub body: NodeBody,
}

impl PlanNode {
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self.body, NodeBody::Leaf(_))
    }

    #[must_use]
    pub fn children(&self) -> &[PlanNode] {
        match &self.body {
            NodeBody::Leaf(_) => &[],
            NodeBody::Composite(children) => children,
        }
    }

    #[must_use]
    pub fn leaf(&self) -> Option<&LeafStep> {
        match &self.body {
            NodeBody::Leaf(step) => Some(step),
            NodeBody::Composite(_) => None,
        }
    }

    /// Pre-order walk of this subtree.
    #[must_use]
    pub fn walk(&self) -> Vec<&PlanNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children().iter().rev());
        }
        out
    }

    /// Leaves in execution order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&PlanNode> {
        self.walk().into_iter().filter(|node| node.is_leaf()).collect()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.children().iter().map(PlanNode::depth).max().unwrap_or(0)
    }

    /// Last leaf in execution order.
    pub(crate) fn last_leaf_mut(&mut self) -> Option<&mut PlanNode> {
        if self.is_leaf() {
            return Some(self);
        }
        match &mut self.body {
            NodeBody::Leaf(_) => None,
            NodeBody::Composite(children) => {
                children.iter_mut().rev().find_map(PlanNode::last_leaf_mut)
            }
        }
    }
}

/// Structural summary of one node, without kernel entry points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSignature {
    pub depth: usize,
    pub scheme: ComputeScheme,
    pub lengths: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<KernelArgs>,
    pub src: Option<BufferRole>,
    pub dst: BufferRole,
    pub scratch_elements: usize,
    pub applies_normalization: bool,
}

/// Serializable structural identity of a plan; equal specs compile to
/// equal fingerprints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFingerprint {
    pub kind: TransformKind,
    pub precision: Precision,
    pub placement: Placement,
    pub lengths: Vec<usize>,
    pub batch: usize,
    pub scratch_elements: usize,
    pub nodes: Vec<NodeSignature>,
}

/// Executable result of compiling one [`TransformSpec`].
#[derive(Debug, Clone)]
pub struct Plan {
    pub(crate) id: String,
    pub(crate) spec: TransformSpec,
    pub(crate) root: PlanNode,
    pub(crate) input_scalars: usize,
    pub(crate) output_scalars: usize,
}

impl Plan {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn spec(&self) -> &TransformSpec {
        &self.spec
    }

    #[must_use]
    pub fn root(&self) -> &PlanNode {
        &self.root
    }

    #[must_use]
    pub fn precision(&self) -> Precision {
        self.spec.precision
    }

    #[must_use]
    pub fn is_in_place(&self) -> bool {
        self.spec.is_in_place()
    }

    /// Total scratch, in complex elements.
    #[must_use]
    pub fn scratch_elements(&self) -> usize {
        self.root.scratch_elements
    }

    /// Total scratch, in scalars of the plan precision.
    #[must_use]
    pub fn scratch_scalars(&self) -> usize {
        self.scratch_elements() * 2
    }

    /// Total scratch, in bytes.
    #[must_use]
    pub fn scratch_bytes(&self) -> usize {
        self.scratch_elements() * self.precision().complex_bytes()
    }

    /// Scalars the input buffer must hold.
    #[must_use]
    pub fn input_scalars(&self) -> usize {
        self.input_scalars
    }

    /// Scalars the output buffer must hold; for in-place plans this is a
    /// second requirement on the input buffer.
    #[must_use]
    pub fn output_scalars(&self) -> usize {
        self.output_scalars
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.root.walk().len()
    }

    #[must_use]
    pub fn leaves(&self) -> Vec<&PlanNode> {
        self.root.leaves()
    }

    /// Nodes that apply the `1/N` normalization.
    #[must_use]
    pub fn normalizing_nodes(&self) -> Vec<&PlanNode> {
        self.root
            .walk()
            .into_iter()
            .filter(|node| node.applies_normalization)
            .collect()
    }

    #[must_use]
    pub fn fingerprint(&self) -> PlanFingerprint {
        let mut nodes = Vec::new();
        let mut stack = vec![(0usize, &self.root)];
        while let Some((depth, node)) = stack.pop() {
            let leaf = node.leaf();
            nodes.push(NodeSignature {
                depth,
                scheme: node.scheme,
                lengths: node.lengths.clone(),
                kernel: leaf.map(|step| step.kernel.name().to_string()),
                args: leaf.map(|step| step.args.clone()),
                src: node.src,
                dst: node.dst,
                scratch_elements: node.scratch_elements,
                applies_normalization: node.applies_normalization,
            });
            stack.extend(node.children().iter().rev().map(|child| (depth + 1, child)));
        }
        PlanFingerprint {
            kind: self.spec.kind,
            precision: self.spec.precision,
            placement: self.spec.placement,
            lengths: self.spec.lengths.clone(),
            batch: self.spec.batch,
            scratch_elements: self.scratch_elements(),
            nodes,
        }
    }
}

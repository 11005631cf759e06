//! Marshaling boundary for the external equality-saturation service.
//!
//! The service runs graph search out of process; this module only converts
//! operations into the flat node schema it consumes (operation kind, operand
//! tensor descriptors, auxiliary vector/integer/matrix arguments) and back.
//! No search or cost logic lives here.

use smol_str::SmolStr;

use crate::{
    error::Result,
    ir::{Module, OpId, OpKind},
    typing::{Dim, Type},
};

/// Shape-and-element descriptor of one tensor-valued operand or result.
/// Dynamic dimensions are encoded as `-1`, matching the service schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDesc {
    pub elem: Type,
    pub dims: Vec<i64>,
}

impl TensorDesc {
    pub fn from_type(ty: &Type) -> Self {
        match ty.as_view() {
            Some(view) => Self {
                elem: view.elem.clone(),
                dims: view
                    .dims
                    .iter()
                    .map(|d| match d {
                        Dim::Fixed(n) => *n as i64,
                        Dim::Dynamic => -1,
                    })
                    .collect(),
            },
            // Scalars travel as rank-zero tensors.
            None => Self { elem: ty.clone(), dims: Vec::new() },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorArg(pub Vec<i64>);

/// Row-major integer matrix argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixArg {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<i64>,
}

/// One exported graph node in the service's flat schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportNode {
    pub kind: SmolStr,
    pub operands: Vec<TensorDesc>,
    pub vector_args: Vec<VectorArg>,
    pub int_args: Vec<i64>,
    pub matrix_args: Vec<MatrixArg>,
}

/// A whole exported graph plus its root descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportedGraph {
    pub nodes: Vec<ExportNode>,
    pub roots: Vec<TensorDesc>,
}

/// The service boundary. Implementations own transport and failure mapping;
/// the engine only requires that answers line up positionally with requests.
pub trait SaturationClient {
    /// Cost estimate per result of the node.
    fn get_cost(&mut self, node: &ExportNode) -> Result<Vec<u64>>;

    /// Inferred output shapes of the node.
    fn get_shape(&mut self, node: &ExportNode) -> Result<Vec<TensorDesc>>;

    /// Hand the whole graph to the search and receive the rewritten one.
    fn apply_rewrite(&mut self, graph: &ExportedGraph) -> Result<ExportedGraph>;
}

/// Marshal one operation into the flat node schema.
///
/// View-typed operands become tensor descriptors; compile-time integer
/// operands travel in `int_args`; any other scalar operand is a rank-zero
/// descriptor. Kind-specific payloads (offset element sizes, constant values)
/// are appended to `int_args` after the operand-derived entries.
pub fn export_op(module: &Module, op: OpId) -> ExportNode {
    let data = module.op(op);
    let mut node = ExportNode {
        kind: SmolStr::new(data.kind.name()),
        operands: Vec::new(),
        vector_args: Vec::new(),
        int_args: Vec::new(),
        matrix_args: Vec::new(),
    };

    for &operand in data.operands() {
        let ty = module.value_type(operand);
        if ty.as_view().is_some() {
            node.operands.push(TensorDesc::from_type(&ty));
        } else if let Some(value) = module.const_int(operand) {
            node.int_args.push(value);
        } else {
            node.operands.push(TensorDesc::from_type(&ty));
        }
    }

    match &data.kind {
        OpKind::AddrOffset { elem_size } => node.int_args.push(*elem_size as i64),
        OpKind::Constant(value) => {
            if let Some(v) = value.int_value() {
                node.int_args.push(v);
            }
        }
        OpKind::Alternatives => {
            // Candidate count so the service sees the search-space width.
            node.int_args.push(data.regions().len() as i64);
        }
        _ => {}
    }

    // Result shapes ride along as vector args, one per result.
    for ty in &data.result_types {
        node.vector_args.push(VectorArg(TensorDesc::from_type(ty).dims));
    }
    node
}

/// Export every operation of the module in deterministic pre-order. Roots are
/// the descriptors of results nothing in the graph consumes.
pub fn export_module(module: &Module) -> ExportedGraph {
    let mut graph = ExportedGraph::default();
    for op in module.walk_ops() {
        graph.nodes.push(export_op(module, op));
        let data = module.op(op);
        for (i, ty) in data.result_types.iter().enumerate() {
            let value = crate::ir::ValueId::result(op, i as u32);
            if !module.has_users(value) {
                graph.roots.push(TensorDesc::from_type(ty));
            }
        }
    }
    log::debug!(
        "exported module `{}`: {} nodes, {} roots",
        module.name,
        graph.nodes.len(),
        graph.roots.len()
    );
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Attributes, ConstValue, ValueId},
        typing::AddrSpace,
    };

    fn module_with_offset_chain() -> (Module, OpId) {
        let mut module = Module::new("export");
        let body = module.body();
        let base = module.create_op(
            OpKind::Opaque("base".into()),
            &[],
            &[Type::Addr(AddrSpace::GENERIC)],
            &[],
            Attributes::new(),
        );
        module.push_op(body, base);
        let c = module.create_op(
            OpKind::Constant(ConstValue::Index(12)),
            &[],
            &[Type::Index],
            &[],
            Attributes::new(),
        );
        module.push_op(body, c);
        let gep = module.create_op(
            OpKind::AddrOffset { elem_size: 4 },
            &[ValueId::result(base, 0), ValueId::result(c, 0)],
            &[Type::Addr(AddrSpace::GENERIC)],
            &[],
            Attributes::new(),
        );
        module.push_op(body, gep);
        (module, gep)
    }

    #[test]
    fn offset_node_carries_index_and_elem_size() {
        let (module, gep) = module_with_offset_chain();
        let node = export_op(&module, gep);
        assert_eq!(node.kind, "addr_offset");
        // Base address is a rank-zero operand; the constant index and the
        // element size travel as integer arguments, in that order.
        assert_eq!(node.operands.len(), 1);
        assert!(node.operands[0].dims.is_empty());
        assert_eq!(node.int_args, vec![12, 4]);
        assert_eq!(node.vector_args.len(), 1);
    }

    #[test]
    fn view_operands_become_tensor_descriptors() {
        let mut module = Module::new("views");
        let body = module.body();
        let view_ty = Type::view(
            Type::Float(32),
            [Dim::Dynamic, Dim::Fixed(8)],
            AddrSpace::GENERIC,
        );
        let v = module.create_op(
            OpKind::Opaque("v".into()),
            &[],
            &[view_ty.clone()],
            &[],
            Attributes::new(),
        );
        module.push_op(body, v);
        let c = module.create_op(
            OpKind::Constant(ConstValue::Index(0)),
            &[],
            &[Type::Index],
            &[],
            Attributes::new(),
        );
        module.push_op(body, c);
        let load = module.create_op(
            OpKind::Load,
            &[ValueId::result(v, 0), ValueId::result(c, 0)],
            &[Type::Float(32)],
            &[],
            Attributes::new(),
        );
        module.push_op(body, load);

        let node = export_op(&module, load);
        assert_eq!(node.kind, "load");
        assert_eq!(
            node.operands,
            vec![TensorDesc { elem: Type::Float(32), dims: vec![-1, 8] }]
        );
        assert_eq!(node.int_args, vec![0]);
    }

    #[test]
    fn module_export_collects_unconsumed_roots() {
        let (module, _) = module_with_offset_chain();
        let graph = export_module(&module);
        assert_eq!(graph.nodes.len(), 3);
        // Only the offset result is unconsumed.
        assert_eq!(graph.roots.len(), 1);
        assert_eq!(graph.roots[0].elem, Type::Addr(AddrSpace::GENERIC));
    }

    /// Positional client stub: answers are checked against what was asked.
    struct Recording {
        asked: Vec<SmolStr>,
    }

    impl SaturationClient for Recording {
        fn get_cost(&mut self, node: &ExportNode) -> Result<Vec<u64>> {
            self.asked.push(node.kind.clone());
            Ok(vec![1; node.vector_args.len()])
        }
        fn get_shape(&mut self, node: &ExportNode) -> Result<Vec<TensorDesc>> {
            self.asked.push(node.kind.clone());
            Ok(node
                .vector_args
                .iter()
                .map(|v| TensorDesc { elem: Type::Index, dims: v.0.clone() })
                .collect())
        }
        fn apply_rewrite(&mut self, graph: &ExportedGraph) -> Result<ExportedGraph> {
            Ok(graph.clone())
        }
    }

    #[test]
    fn client_roundtrip_preserves_the_graph() {
        let (module, gep) = module_with_offset_chain();
        let graph = export_module(&module);
        let mut client = Recording { asked: Vec::new() };

        let node = export_op(&module, gep);
        assert_eq!(client.get_cost(&node).unwrap().len(), 1);
        let shapes = client.get_shape(&node).unwrap();
        assert_eq!(shapes.len(), 1);

        let rewritten = client.apply_rewrite(&graph).unwrap();
        assert_eq!(rewritten, graph);
        assert_eq!(client.asked, vec![SmolStr::new("addr_offset"); 2]);
    }
}

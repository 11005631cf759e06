//! Deterministic textual form of a module.
//!
//! Used for diagnostics and for structural-equality checks in tests: two
//! graphs print identically iff they are structurally identical up to value
//! numbering.

use std::collections::HashMap;
use std::fmt::Write;

use crate::typing::{Dim, Type};

use super::{
    attrs::Attribute,
    module::Module,
    op::{OpId, RegionId, ValueId},
};

pub fn print_module(module: &Module) -> String {
    let mut printer = Printer { module, names: HashMap::new(), next: 0, out: String::new() };
    let _ = writeln!(printer.out, "module @{} {{", module.name);
    printer.print_region(module.body(), 1);
    printer.out.push_str("}\n");
    printer.out
}

struct Printer<'ir> {
    module: &'ir Module,
    names: HashMap<ValueId, usize>,
    next: usize,
    out: String,
}

impl<'ir> Printer<'ir> {
    fn name_of(&mut self, value: ValueId) -> usize {
        if let Some(&n) = self.names.get(&value) {
            return n;
        }
        let n = self.next;
        self.next += 1;
        self.names.insert(value, n);
        n
    }

    fn print_region(&mut self, region: RegionId, depth: usize) {
        let data = self.module.region(region);
        if data.num_args() > 0 {
            let indent = "  ".repeat(depth);
            let mut header = String::new();
            for i in 0..data.num_args() {
                let n = self.name_of(ValueId::arg(region, i as u32));
                if i > 0 {
                    header.push_str(", ");
                }
                let _ = write!(header, "%{n}: {}", fmt_type(&data.arg_types[i]));
            }
            let _ = writeln!(self.out, "{indent}^({header}):");
        }
        for &op in &self.module.region(region).ops().to_vec() {
            self.print_op(op, depth);
        }
    }

    fn print_op(&mut self, op: OpId, depth: usize) {
        let indent = "  ".repeat(depth);
        let data = self.module.op(op);
        let mut line = String::new();

        if data.num_results() > 0 {
            for i in 0..data.num_results() {
                let n = self.name_of(ValueId::result(op, i as u32));
                if i > 0 {
                    line.push_str(", ");
                }
                let _ = write!(line, "%{n}");
            }
            line.push_str(" = ");
        }
        line.push_str(data.kind.name());
        if let Some(value) = data.constant_value() {
            let _ = write!(line, " {value:?}");
        }
        if let crate::ir::OpKind::AddrOffset { elem_size } = data.kind {
            let _ = write!(line, "<{elem_size}>");
        }

        line.push('(');
        for (i, &operand) in data.operands().iter().enumerate() {
            let n = self.name_of(operand);
            if i > 0 {
                line.push_str(", ");
            }
            let _ = write!(line, "%{n}");
        }
        line.push(')');

        let attr_text = fmt_attrs(data);
        if !attr_text.is_empty() {
            let _ = write!(line, " {{{attr_text}}}");
        }

        if data.num_results() > 0 {
            line.push_str(" : ");
            for (i, ty) in data.result_types.iter().enumerate() {
                if i > 0 {
                    line.push_str(", ");
                }
                line.push_str(&fmt_type(ty));
            }
        }

        let regions = data.regions().to_vec();
        if regions.is_empty() {
            let _ = writeln!(self.out, "{indent}{line}");
        } else {
            let _ = writeln!(self.out, "{indent}{line} {{");
            for (i, region) in regions.iter().enumerate() {
                if i > 0 {
                    let _ = writeln!(self.out, "{indent}}} {{");
                }
                self.print_region(*region, depth + 1);
            }
            let _ = writeln!(self.out, "{indent}}}");
        }
    }
}

fn fmt_attrs(op: &super::op::Operation) -> String {
    let mut parts = Vec::new();
    for (key, value) in op.attrs.iter() {
        let rendered = match value {
            Attribute::Bool(b) => format!("{b}"),
            Attribute::Int(i) => format!("{i}"),
            Attribute::Str(s) => format!("{s:?}"),
            Attribute::Symbol(s) => format!("@{s}"),
            Attribute::StrList(list) => format!("{list:?}"),
            Attribute::IntList(list) => format!("{list:?}"),
            Attribute::Effects(set) => format!("{:?}", set.names()),
            Attribute::Aliases(list) => {
                let items: Vec<String> = list
                    .iter()
                    .map(|a| format!("({:?} -> {:?})", a.operand_index, a.output_index))
                    .collect();
                format!("[{}]", items.join(", "))
            }
        };
        parts.push(format!("{key} = {rendered}"));
    }
    parts.join(", ")
}

pub fn fmt_type(ty: &Type) -> String {
    match ty {
        Type::Int(bits) => format!("i{bits}"),
        Type::Float(bits) => format!("f{bits}"),
        Type::Index => "index".into(),
        Type::Token => "token".into(),
        Type::Addr(space) => format!("addr<{}>", space.0),
        Type::View(view) => {
            let dims: Vec<String> = view
                .dims
                .iter()
                .map(|d| match d {
                    Dim::Fixed(n) => n.to_string(),
                    Dim::Dynamic => "?".into(),
                })
                .collect();
            format!("view<{}x{}, {}>", dims.join("x"), fmt_type(&view.elem), view.space.0)
        }
    }
}

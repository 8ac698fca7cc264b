//! Recursive, post-order translation of the IR tree into lowered statements.
//!
//! Children are always lowered before their parent reads their
//! `destination()`, so evaluation order falls out of the traversal order for
//! free. Every [`NodeId`] that reaches [`Lowerer::lower_stat`] or
//! [`Lowerer::lower_expr`] gets a flat run of [`StmtId`]s recorded against it
//! in the [`Arena`] — invariant 1 in [8].

pub mod stmt;

use crate::ir::tree::{Arena, BinOp as TreeBinOp, Node, NodeId};
use crate::ir::{Symbol, SymbolPool, Type};
use crate::result::{CodegenError, CodegenResult};
use stmt::{LoweredStat, StmtId, StmtKind, StmtPool};

pub struct Lowerer<'a> {
    pub arena: &'a mut Arena,
    pub symbols: &'a mut SymbolPool,
    pub stmts: &'a mut StmtPool,
}

impl<'a> Lowerer<'a> {
    pub fn new(arena: &'a mut Arena, symbols: &'a mut SymbolPool, stmts: &'a mut StmtPool) -> Self {
        Lowerer { arena, symbols, stmts }
    }

    fn push(&mut self, kind: StmtKind) -> StmtId {
        self.stmts.push(LoweredStat::new(kind))
    }

    /// Lower an expression node, returning the flattened instruction run and
    /// the symbol holding its value. Records the run's last statement as
    /// `node`'s lowered form.
    pub fn lower_expr(&mut self, node: NodeId) -> CodegenResult<(Vec<StmtId>, Symbol)> {
        let result = self.lower_expr_inner(node)?;
        if let Some(&last) = result.0.last() {
            self.arena.set_lowered(node, last);
        }
        Ok(result)
    }

    fn lower_expr_inner(&mut self, node: NodeId) -> CodegenResult<(Vec<StmtId>, Symbol)> {
        match self.arena.get(node).clone() {
            Node::Const { value, symbol } => {
                let mut run = Vec::new();
                let dest = match (value, symbol) {
                    (Some(v), None) => {
                        let dest = self.symbols.new_temporary(Type::INT);
                        run.push(self.push(StmtKind::LoadImm { dest, value: v }));
                        dest
                    }
                    (None, Some(sym)) => {
                        let ty = self.symbols.get(sym).ty.clone();
                        let dest = self.symbols.new_temporary(ty);
                        run.push(self.push(StmtKind::Load { dest, symbol: sym }));
                        dest
                    }
                    _ => return Err(CodegenError::ir("Const node must carry exactly one of value/symbol")),
                };
                Ok((run, dest))
            }
            Node::Var { symbol } => {
                let ty = self.symbols.get(symbol).ty.clone();
                let dest = self.symbols.new_temporary(ty);
                let s = self.push(StmtKind::Load { dest, symbol });
                Ok((vec![s], dest))
            }
            Node::ReadExpr => {
                let dest = self.symbols.new_temporary(Type::INT);
                let s = self.push(StmtKind::Read { dest });
                Ok((vec![s], dest))
            }
            Node::ArrayElement { symbol, offset } => {
                let (mut run, off) = self.lower_expr(offset)?;
                let elem_ty = self
                    .symbols
                    .get(symbol)
                    .ty
                    .element_type()
                    .cloned()
                    .ok_or_else(|| CodegenError::ir("array access on a non-array symbol"))?;

                let ptr_ty = Type::pointer_to(elem_ty.clone());
                let base = self.symbols.new_temporary(ptr_ty.clone());
                run.push(self.push(StmtKind::LoadAddr { dest: base, symbol }));

                let addr = self.symbols.new_temporary(ptr_ty);
                run.push(self.push(StmtKind::BinOp { dest: addr, op: TreeBinOp::Plus, lhs: base, rhs: off }));

                let dest = self.symbols.new_temporary(elem_ty);
                run.push(self.push(StmtKind::Load { dest, symbol: addr }));
                Ok((run, dest))
            }
            Node::BinExpr { op, lhs, rhs } => {
                let (mut run, a) = self.lower_expr(lhs)?;
                let (run_b, b) = self.lower_expr(rhs)?;
                run.extend(run_b);
                let ty = Type::widen_for_binop(&self.symbols.get(a).ty.clone(), &self.symbols.get(b).ty.clone());
                let dest = self.symbols.new_temporary(ty);
                run.push(self.push(StmtKind::BinOp { dest, op, lhs: a, rhs: b }));
                Ok((run, dest))
            }
            Node::UnExpr { op, operand } => {
                let (mut run, src) = self.lower_expr(operand)?;
                let ty = self.symbols.get(src).ty.clone();
                let dest = self.symbols.new_temporary(ty);
                run.push(self.push(StmtKind::UnaryOp { dest, op, src }));
                Ok((run, dest))
            }
            _ => Err(CodegenError::ir("node used as an expression is not expression-shaped")),
        }
    }

    /// Lower a statement node. Returns the flattened instruction run; value
    /// is discarded (statements don't have a meaningful destination).
    /// Records the run's last statement as `node`'s lowered form.
    pub fn lower_stat(&mut self, node: NodeId) -> CodegenResult<Vec<StmtId>> {
        let run = self.lower_stat_inner(node)?;
        if let Some(&last) = run.last() {
            self.arena.set_lowered(node, last);
        }
        Ok(run)
    }

    fn lower_stat_inner(&mut self, node: NodeId) -> CodegenResult<Vec<StmtId>> {
        match self.arena.get(node).clone() {
            Node::Assign { target, offset, expr } => {
                let (mut run, src) = self.lower_expr(expr)?;
                let mut dest = target;
                if let Some(off_node) = offset {
                    let (off_run, off) = self.lower_expr(off_node)?;
                    run.extend(off_run);

                    let elem_ty = match &self.symbols.get(dest).ty {
                        Type::Array(_, elem) => (**elem).clone(),
                        other => other.clone(),
                    };
                    let ptr_ty = Type::pointer_to(elem_ty);
                    let base = self.symbols.new_temporary(ptr_ty.clone());
                    run.push(self.push(StmtKind::LoadAddr { dest: base, symbol: dest }));
                    let addr = self.symbols.new_temporary(ptr_ty);
                    run.push(self.push(StmtKind::BinOp { dest: addr, op: TreeBinOp::Plus, lhs: base, rhs: off }));
                    dest = addr;
                }
                run.push(self.push(StmtKind::Store { dest, symbol: src }));
                Ok(run)
            }
            Node::Call { target } => {
                let s = self.push(StmtKind::Branch { target, condition: None, negated: false, returns: true });
                Ok(vec![s])
            }
            Node::Print { expr } => {
                let (mut run, src) = self.lower_expr(expr)?;
                run.push(self.push(StmtKind::Print { src }));
                Ok(run)
            }
            Node::If { cond, then_branch, else_branch } => {
                let (cond_run, cond_val) = self.lower_expr(cond)?;
                let mut run = cond_run;
                let exit_label = self.symbols.new_label();

                if let Some(else_node) = else_branch {
                    let then_label = self.symbols.new_label();
                    let mut then_run = self.lower_stat(then_branch)?;
                    label_first(self.stmts, &then_run, then_label);

                    let branch_to_then = self.push(StmtKind::Branch {
                        target: then_label,
                        condition: Some(cond_val),
                        negated: false,
                        returns: false,
                    });
                    let branch_to_exit =
                        self.push(StmtKind::Branch { target: exit_label, condition: None, negated: false, returns: false });

                    run.push(branch_to_then);
                    run.extend(self.lower_stat(else_node)?);
                    run.push(branch_to_exit);
                    run.append(&mut then_run);
                } else {
                    let branch_to_exit = self.push(StmtKind::Branch {
                        target: exit_label,
                        condition: Some(cond_val),
                        negated: true,
                        returns: false,
                    });
                    run.push(branch_to_exit);
                    run.extend(self.lower_stat(then_branch)?);
                }
                let exit_stat = self.push(StmtKind::Empty);
                self.stmts.get_mut(exit_stat).set_label(exit_label);
                run.push(exit_stat);
                Ok(run)
            }
            Node::While { cond, body } => {
                let entry_label = self.symbols.new_label();
                let exit_label = self.symbols.new_label();

                let (mut cond_run, cond_val) = self.lower_expr(cond)?;
                label_first(self.stmts, &cond_run, entry_label);

                let branch_out =
                    self.push(StmtKind::Branch { target: exit_label, condition: Some(cond_val), negated: true, returns: false });
                let loop_back = self.push(StmtKind::Branch { target: entry_label, condition: None, negated: false, returns: false });
                let exit_stat = self.push(StmtKind::Empty);
                self.stmts.get_mut(exit_stat).set_label(exit_label);

                let mut run = Vec::new();
                run.append(&mut cond_run);
                run.push(branch_out);
                run.extend(self.lower_stat(body)?);
                run.push(loop_back);
                run.push(exit_stat);
                Ok(run)
            }
            Node::StatList { children } => {
                let mut run = Vec::new();
                for child in children {
                    run.extend(self.lower_stat(child)?);
                }
                Ok(run)
            }
            Node::Empty => Ok(vec![self.push(StmtKind::Empty)]),
            Node::Const { .. }
            | Node::Var { .. }
            | Node::ArrayElement { .. }
            | Node::BinExpr { .. }
            | Node::UnExpr { .. }
            | Node::ReadExpr => Err(CodegenError::ir("expression node used where a statement was expected")),
        }
    }
}

/// Attaches `label` to the first statement of `run`, the way the original
/// assigns a loop/branch label to whatever the condition lowered into.
fn label_first(stmts: &mut StmtPool, run: &[StmtId], label: Symbol) {
    if let Some(&first) = run.first() {
        stmts.get_mut(first).set_label(label);
    }
}

/// Lower every procedure in a program, producing one flat statement run per
/// procedure and binding each `NodeId` it touches to its lowered form.
pub struct LoweredProgram {
    pub runs: std::collections::HashMap<Option<Symbol>, Vec<StmtId>>,
}

pub fn lower_program(
    arena: &mut Arena,
    symbols: &mut SymbolPool,
    stmts: &mut StmtPool,
    root: &crate::ir::Procedure,
) -> CodegenResult<LoweredProgram> {
    let mut runs = std::collections::HashMap::new();
    for proc in root.postorder() {
        let run = {
            let mut lowerer = Lowerer::new(arena, symbols, stmts);
            lowerer.lower_stat(proc.body)?
        };
        runs.insert(proc.symbol, run);
    }
    Ok(LoweredProgram { runs })
}

//! Deferred computation graph
//!
//! A `FutureGraph` is an append-only arena of expression nodes addressed by
//! position. Callers never hold nodes directly: every push returns a
//! [`FutureHandle`] (the POINTER of the wire model) carrying the index of the
//! node it addresses. Operands always point backwards, so the graph is a DAG
//! by construction.
//!
//! ## Resolution
//!
//! [`FutureGraph::resolve`] evaluates a node in post-order against an
//! environment of concrete reads (`key -> ReadResult`). The walk keeps its own
//! stack, so chain depth is bounded by memory rather than the thread stack, and
//! each node is computed at most once per call however many paths reach it.
//!
//! - `Resolution::Transient` computes the value and leaves every node as it was.
//! - `Resolution::Durable` writes each computed value back into its node, so
//!   later resolutions return the cached value without walking its operands.
//!
//! A node that is already resolved short-circuits in both modes.
//!
//! ## Values
//!
//! Resolved values are byte strings. `None` is the absent marker produced by a
//! READ of a key that did not exist. Numeric results render as decimal text,
//! floats always with a decimal point and never in exponent form (`100.0`,
//! `10000000000000000.0`), booleans as `True`/`False`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use deferkv_core::{Error, ExprError, ReadResult, Result};

/// Rendering of a true boolean result
pub const TRUE: &str = "True";
/// Rendering of a false boolean result
pub const FALSE: &str = "False";

/// Operation carried by a future node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    /// Value of a store key
    Read,
    /// External handle; never stored as a node
    Pointer,
    /// Integer addition
    AddInt,
    /// Floating point addition
    AddFloat,
    /// Integer subtraction
    SubInt,
    /// Floating point subtraction
    SubFloat,
    /// Floating point multiplication
    MulFloat,
    /// Future on the left, literal appended
    ConcatLeft,
    /// Literal on the left, future appended
    ConcatRight,
    /// First N characters of the left operand
    Truncate,
    /// Integer `left >= right`
    GteInt,
    /// Existence flag of a READ
    Exists,
    /// Whether the right operand occurs within the left
    SubstringOf,
    /// Placeholder; never a valid node
    None,
}

impl Opcode {
    /// Wire name of the opcode
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Read => "READ",
            Opcode::Pointer => "POINTER",
            Opcode::AddInt => "ADD_INT",
            Opcode::AddFloat => "ADD_FLOAT",
            Opcode::SubInt => "SUB_INT",
            Opcode::SubFloat => "SUB_FLOAT",
            Opcode::MulFloat => "MUL_FLOAT",
            Opcode::ConcatLeft => "CONCAT_LEFT",
            Opcode::ConcatRight => "CONCAT_RIGHT",
            Opcode::Truncate => "TRUNCATE",
            Opcode::GteInt => "GTE_INT",
            Opcode::Exists => "EXISTS",
            Opcode::SubstringOf => "SUBSTRING_OF",
            Opcode::None => "NONE",
        }
    }

    /// Whether the opcode takes two operands
    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            Opcode::AddInt
                | Opcode::AddFloat
                | Opcode::SubInt
                | Opcode::SubFloat
                | Opcode::MulFloat
                | Opcode::ConcatLeft
                | Opcode::ConcatRight
                | Opcode::Truncate
                | Opcode::GteInt
                | Opcode::SubstringOf
        )
    }

    /// Whether the opcode takes a single future operand
    pub fn is_unary(&self) -> bool {
        matches!(self, Opcode::Exists)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle to a node of a `FutureGraph`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FutureHandle {
    index: usize,
}

impl FutureHandle {
    pub(crate) fn new(index: usize) -> Self {
        Self { index }
    }

    /// Position of the addressed node
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Operand of a binary node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// Another node of the same graph
    Future(FutureHandle),
    /// Concrete value known when the node was built
    Literal(String),
}

impl Operand {
    /// Literal operand from anything displayable
    pub fn literal(value: impl fmt::Display) -> Self {
        Operand::Literal(value.to_string())
    }

    /// The handle, if this operand is a future
    pub fn as_future(&self) -> Option<FutureHandle> {
        match self {
            Operand::Future(h) => Some(*h),
            Operand::Literal(_) => None,
        }
    }
}

impl From<FutureHandle> for Operand {
    fn from(handle: FutureHandle) -> Self {
        Operand::Future(handle)
    }
}

/// Node of the graph
///
/// `None` in the cache slot (`data` / `value`) means unresolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FutureNode {
    /// Value of a store key
    Read {
        /// Key to read
        key: String,
        /// Bound read result once resolved
        data: Option<ReadResult>,
    },
    /// Operator over two operands
    Binary {
        /// Operator
        op: Opcode,
        /// Left operand
        left: Operand,
        /// Right operand
        right: Operand,
        /// Cached result
        value: Option<Vec<u8>>,
    },
    /// Operator over one future
    Unary {
        /// Operator
        op: Opcode,
        /// Operand node
        param: FutureHandle,
        /// Cached result
        value: Option<Vec<u8>>,
    },
}

impl FutureNode {
    /// Opcode of this node
    pub fn opcode(&self) -> Opcode {
        match self {
            FutureNode::Read { .. } => Opcode::Read,
            FutureNode::Binary { op, .. } | FutureNode::Unary { op, .. } => *op,
        }
    }

    /// Whether a durable resolution has cached this node's value
    pub fn is_resolved(&self) -> bool {
        match self {
            FutureNode::Read { data, .. } => data.is_some(),
            FutureNode::Binary { value, .. } | FutureNode::Unary { value, .. } => value.is_some(),
        }
    }

    fn cached(&self) -> Option<Option<Vec<u8>>> {
        match self {
            FutureNode::Read { data, .. } => data.as_ref().map(|d| d.value().map(<[u8]>::to_vec)),
            FutureNode::Binary { value, .. } | FutureNode::Unary { value, .. } => {
                value.as_ref().map(|v| Some(v.clone()))
            }
        }
    }
}

/// How `resolve` treats computed values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Compute without caching
    Transient,
    /// Cache every computed value in its node
    Durable,
}

/// Append-only arena of future nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FutureGraph {
    nodes: Vec<FutureNode>,
}

impl FutureGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in insertion order
    pub fn nodes(&self) -> &[FutureNode] {
        &self.nodes
    }

    /// Node addressed by `handle`
    pub fn get(&self, handle: FutureHandle) -> Option<&FutureNode> {
        self.nodes.get(handle.index)
    }

    /// Remove every node, keeping the allocation
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Append a READ node bound to `key`
    pub fn push_read(&mut self, key: impl Into<String>) -> FutureHandle {
        self.push(FutureNode::Read {
            key: key.into(),
            data: None,
        })
    }

    /// Append a binary node
    ///
    /// # Errors
    ///
    /// - `InvalidOpcode` if `op` does not take two operands
    /// - `InvalidHandle` if an operand handle does not address a node
    pub fn push_binary(
        &mut self,
        op: Opcode,
        left: impl Into<Operand>,
        right: impl Into<Operand>,
    ) -> Result<FutureHandle> {
        if !op.is_binary() {
            return Err(Error::InvalidOpcode {
                opcode: op.to_string(),
                context: "binary node",
            });
        }
        let (left, right) = (left.into(), right.into());
        for operand in [&left, &right] {
            if let Some(h) = operand.as_future() {
                self.check(h)?;
            }
        }
        Ok(self.push(FutureNode::Binary {
            op,
            left,
            right,
            value: None,
        }))
    }

    /// Append a unary node
    ///
    /// # Errors
    ///
    /// - `InvalidOpcode` if `op` is not a unary opcode
    /// - `InvalidHandle` if `param` does not address a node
    /// - `Expression(NotARead)` if `EXISTS` is applied to anything but a READ
    pub fn push_unary(&mut self, op: Opcode, param: FutureHandle) -> Result<FutureHandle> {
        if !op.is_unary() {
            return Err(Error::InvalidOpcode {
                opcode: op.to_string(),
                context: "unary node",
            });
        }
        if self.check(param)?.opcode() != Opcode::Read {
            return Err(ExprError::NotARead { index: param.index }.into());
        }
        Ok(self.push(FutureNode::Unary {
            op,
            param,
            value: None,
        }))
    }

    /// Attach a concrete read result to a READ node
    ///
    /// # Errors
    ///
    /// Fails if `handle` does not address a READ node.
    pub fn bind_read(&mut self, handle: FutureHandle, result: ReadResult) -> Result<()> {
        let len = self.nodes.len();
        match self.nodes.get_mut(handle.index) {
            Some(FutureNode::Read { data, .. }) => {
                *data = Some(result);
                Ok(())
            }
            Some(_) => Err(ExprError::NotARead {
                index: handle.index,
            }
            .into()),
            None => Err(Error::InvalidHandle {
                index: handle.index,
                len,
            }),
        }
    }

    /// Store keys the expression at `handle` depends on
    ///
    /// Follows every future operand down to its READ leaves. Keys are listed
    /// once, in first-visited order.
    pub fn keys_of(&self, handle: FutureHandle) -> Result<Vec<String>> {
        self.node(handle.index)?;
        let mut keys: Vec<String> = Vec::new();
        let mut seen = vec![false; handle.index + 1];
        let mut stack = vec![handle.index];

        while let Some(index) = stack.pop() {
            if std::mem::replace(&mut seen[index], true) {
                continue;
            }
            match self.node(index)? {
                FutureNode::Read { key, .. } => {
                    if !keys.contains(key) {
                        keys.push(key.clone());
                    }
                }
                FutureNode::Binary { left, right, .. } => {
                    // Right first so the left operand is visited first
                    for h in [right, left].into_iter().filter_map(Operand::as_future) {
                        stack.push(self.operand_index(index, h)?);
                    }
                }
                FutureNode::Unary { param, .. } => {
                    stack.push(self.operand_index(index, *param)?);
                }
            }
        }
        Ok(keys)
    }

    /// Evaluate the expression addressed by `handle`
    ///
    /// READ nodes that are not yet resolved take their value from `env`.
    ///
    /// # Errors
    ///
    /// - `InvalidHandle` if a handle does not address an earlier node
    /// - `UnboundRead` if an unresolved READ has no entry in `env`
    /// - `InvalidOpcode` for POINTER / NONE nodes or misplaced opcodes
    /// - `Expression` if an operand cannot be interpreted
    pub fn resolve(
        &mut self,
        handle: FutureHandle,
        env: &HashMap<String, ReadResult>,
        mode: Resolution,
    ) -> Result<Option<Vec<u8>>> {
        self.eval(handle.index, env, mode)
    }

    // Post-order walk with an explicit stack. `memo[i]` holds the value of
    // node `i` once computed in this call; operands point backwards, so only
    // indices up to `root` are ever visited.
    fn eval(
        &mut self,
        root: usize,
        env: &HashMap<String, ReadResult>,
        mode: Resolution,
    ) -> Result<Option<Vec<u8>>> {
        self.node(root)?;
        let mut memo: Vec<Option<Option<Vec<u8>>>> = vec![None; root + 1];
        let mut stack = vec![root];

        while let Some(&index) = stack.last() {
            if memo[index].is_some() {
                stack.pop();
                continue;
            }
            if let Some(cached) = self.node(index)?.cached() {
                memo[index] = Some(cached);
                stack.pop();
                continue;
            }

            let pending = self.pending_operands(index, env, &memo)?;
            if !pending.is_empty() {
                stack.extend(pending);
                continue;
            }

            let value = self.compute(index, env, &memo, mode)?;
            memo[index] = Some(value);
            stack.pop();
        }

        Ok(memo.pop().flatten().flatten())
    }

    // Operand nodes of `index` still to be computed, last to run first
    fn pending_operands(
        &self,
        index: usize,
        env: &HashMap<String, ReadResult>,
        memo: &[Option<Option<Vec<u8>>>],
    ) -> Result<Vec<usize>> {
        let mut pending = Vec::new();
        match self.node(index)? {
            FutureNode::Read { .. } => {}
            FutureNode::Binary { left, right, .. } => {
                for h in [right, left].into_iter().filter_map(Operand::as_future) {
                    let operand = self.operand_index(index, h)?;
                    if memo[operand].is_none() {
                        pending.push(operand);
                    }
                }
            }
            FutureNode::Unary { op, param, .. } => {
                if *op != Opcode::Exists {
                    return Err(Error::InvalidOpcode {
                        opcode: op.to_string(),
                        context: "unary node",
                    });
                }
                let operand = self.operand_index(index, *param)?;
                match self.node(operand)? {
                    // EXISTS only needs the READ when env can bind it
                    FutureNode::Read { key, data: None } => {
                        if env.contains_key(key) && memo[operand].is_none() {
                            pending.push(operand);
                        }
                    }
                    FutureNode::Read { .. } => {}
                    _ => return Err(ExprError::NotARead { index: operand }.into()),
                }
            }
        }
        Ok(pending)
    }

    // Value of node `index` once every operand it needs is in `memo`
    fn compute(
        &mut self,
        index: usize,
        env: &HashMap<String, ReadResult>,
        memo: &[Option<Option<Vec<u8>>>],
        mode: Resolution,
    ) -> Result<Option<Vec<u8>>> {
        match self.node(index)?.clone() {
            FutureNode::Read { key, .. } => {
                let bound = env
                    .get(&key)
                    .cloned()
                    .ok_or(Error::UnboundRead { key })?;
                let value = bound.value().map(<[u8]>::to_vec);
                if mode == Resolution::Durable {
                    if let FutureNode::Read { data, .. } = &mut self.nodes[index] {
                        *data = Some(bound);
                    }
                }
                Ok(value)
            }
            FutureNode::Binary {
                op, left, right, ..
            } => {
                let l = self.operand_value(index, &left, memo)?;
                let r = self.operand_value(index, &right, memo)?;
                let value = apply_binary(index, op, l, r)?;
                self.cache(index, &value, mode);
                Ok(Some(value))
            }
            FutureNode::Unary { param, .. } => {
                let operand = self.operand_index(index, param)?;
                let existed = match (&memo[operand], self.node(operand)?) {
                    (Some(value), _) => value.is_some(),
                    (None, FutureNode::Read { data, .. }) => {
                        matches!(data, Some(d) if d.existed)
                    }
                    (None, _) => return Err(ExprError::NotARead { index: operand }.into()),
                };
                let value = render_bool(existed);
                self.cache(index, &value, mode);
                Ok(Some(value))
            }
        }
    }

    fn operand_value(
        &self,
        owner: usize,
        operand: &Operand,
        memo: &[Option<Option<Vec<u8>>>],
    ) -> Result<Option<Vec<u8>>> {
        match operand {
            Operand::Literal(text) => Ok(Some(text.as_bytes().to_vec())),
            Operand::Future(h) => {
                let index = self.operand_index(owner, *h)?;
                Ok(memo[index].clone().flatten())
            }
        }
    }

    fn cache(&mut self, index: usize, computed: &[u8], mode: Resolution) {
        if mode == Resolution::Transient {
            return;
        }
        match &mut self.nodes[index] {
            FutureNode::Binary { value, .. } | FutureNode::Unary { value, .. } => {
                *value = Some(computed.to_vec());
            }
            FutureNode::Read { .. } => {}
        }
    }

    fn push(&mut self, node: FutureNode) -> FutureHandle {
        self.nodes.push(node);
        FutureHandle::new(self.nodes.len() - 1)
    }

    fn check(&self, handle: FutureHandle) -> Result<&FutureNode> {
        self.node(handle.index)
    }

    fn node(&self, index: usize) -> Result<&FutureNode> {
        self.nodes.get(index).ok_or(Error::InvalidHandle {
            index,
            len: self.nodes.len(),
        })
    }

    // Operands must reference earlier nodes; a decoded graph may not.
    fn operand_index(&self, owner: usize, handle: FutureHandle) -> Result<usize> {
        if handle.index >= owner {
            return Err(Error::InvalidHandle {
                index: handle.index,
                len: owner,
            });
        }
        Ok(handle.index)
    }
}

fn apply_binary(index: usize, op: Opcode, left: Option<Vec<u8>>, right: Option<Vec<u8>>) -> Result<Vec<u8>> {
    let left = text(index, left)?;
    let right = text(index, right)?;

    let rendered = match op {
        Opcode::AddInt => int(&left)?
            .checked_add(int(&right)?)
            .ok_or(ExprError::Overflow { index })?
            .to_string(),
        Opcode::SubInt => int(&left)?
            .checked_sub(int(&right)?)
            .ok_or(ExprError::Overflow { index })?
            .to_string(),
        Opcode::AddFloat => render_float(float(&left)? + float(&right)?),
        Opcode::SubFloat => render_float(float(&left)? - float(&right)?),
        Opcode::MulFloat => render_float(float(&left)? * float(&right)?),
        Opcode::ConcatLeft | Opcode::ConcatRight => left + &right,
        Opcode::Truncate => {
            let n: usize = right.trim().parse().map_err(|_| ExprError::NotANumber {
                value: right.clone(),
                expected: "character count",
            })?;
            left.chars().take(n).collect()
        }
        Opcode::GteInt => return Ok(render_bool(int(&left)? >= int(&right)?)),
        Opcode::SubstringOf => return Ok(render_bool(left.contains(right.as_str()))),
        other => {
            return Err(Error::InvalidOpcode {
                opcode: other.to_string(),
                context: "binary node",
            })
        }
    };
    Ok(rendered.into_bytes())
}

fn text(index: usize, value: Option<Vec<u8>>) -> std::result::Result<String, ExprError> {
    let bytes = value.ok_or(ExprError::AbsentOperand { index })?;
    String::from_utf8(bytes).map_err(|_| ExprError::InvalidUtf8 { index })
}

fn int(text: &str) -> std::result::Result<i64, ExprError> {
    text.trim().parse().map_err(|_| ExprError::NotANumber {
        value: text.to_string(),
        expected: "integer",
    })
}

fn float(text: &str) -> std::result::Result<f64, ExprError> {
    text.trim().parse().map_err(|_| ExprError::NotANumber {
        value: text.to_string(),
        expected: "float",
    })
}

/// Render a float the way results are stored: shortest round-trip digits,
/// never in exponent form, always with a decimal point when finite
pub fn render_float(value: f64) -> String {
    let mut text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        text.push_str(".0");
    }
    text
}

fn render_bool(value: bool) -> Vec<u8> {
    let text = if value { TRUE } else { FALSE };
    text.as_bytes().to_vec()
}

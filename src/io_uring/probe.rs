use std::fmt;

use super::{
    constants::IO_URING_OP_SUPPORTED, io_uring_probe_buf, Opcode,
};

/// Which operations the running kernel supports.
///
/// Get one from [`Uring::probe`](crate::Uring::probe), or from
/// [`probe`](crate::probe) without a ring of your own.
#[derive(Clone, PartialEq, Eq)]
pub struct Probe {
    last_op: u8,
    ops: Vec<(Opcode, bool)>,
}

impl Probe {
    pub(crate) fn from_raw(raw: &io_uring_probe_buf) -> Probe {
        let len = usize::from(raw.header.ops_len).min(raw.ops.len());
        let ops = raw.ops[..len]
            .iter()
            .map(|op| {
                (
                    Opcode::from(op.op),
                    op.flags & IO_URING_OP_SUPPORTED != 0,
                )
            })
            .collect();
        Probe { last_op: raw.header.last_op, ops }
    }

    /// The highest operation code the kernel knows about.
    pub fn last_op(&self) -> Opcode {
        Opcode::from(self.last_op)
    }

    /// Whether `op` can be submitted. Anything past
    /// [`last_op`](Probe::last_op) is unsupported.
    pub fn is_supported(&self, op: Opcode) -> bool {
        let code = u8::from(op);
        code <= self.last_op
            && self
                .ops
                .get(usize::from(code))
                .map_or(false, |&(_, supported)| supported)
    }

    /// Every op slot the kernel reported, in order.
    pub fn ops(&self) -> impl Iterator<Item = (Opcode, bool)> + '_ {
        self.ops.iter().copied()
    }

    /// The supported operations.
    pub fn supported(&self) -> impl Iterator<Item = Opcode> + '_ {
        self.ops().filter(|&(_, s)| s).map(|(op, _)| op)
    }
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probe")
            .field("last_op", &self.last_op())
            .field("supported", &self.supported().collect::<Vec<_>>())
            .finish()
    }
}

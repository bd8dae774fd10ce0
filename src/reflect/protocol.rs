//! Module header, startup handshake and method table
//!
//! Every value here is an 8-byte float cell holding a non-negative integer.

use crate::bridge::{Bridge, CallbackTable, Invocation, MemoryView, CELL};
use crate::errors::{Fault, Result};
use tracing::debug;

/// Fixed header every module exposes at `Bridge::header_offset()`
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleHeader {
    /// Width of the descriptor child field, 4 or 8
    pub pointer_width: usize,
    pub reflect_all: u64,
    pub reflect_one: u64,
    /// One entry point address per exported call, by ordinal
    pub calls: Vec<u64>,
}

impl ModuleHeader {
    pub fn read(bridge: &dyn Bridge) -> Result<Self> {
        let view = MemoryView::acquire(bridge)?;
        let at = bridge.header_offset();
        let cell = |index: usize, what: &str| -> Result<u64> {
            cell_integer(view.cell_f64(at + index * CELL)?, what)
        };

        let pointer_width = cell(0, "pointer width")? as usize;
        if pointer_width != 4 && pointer_width != 8 {
            return Err(Fault::mismatch(format!(
                "pointer width {} is neither 4 nor 8",
                pointer_width
            )));
        }
        let count = cell(1, "call count")? as usize;
        let reflect_all = cell(2, "reflect-all address")?;
        let reflect_one = cell(3, "reflect-one address")?;
        let calls = (0..count)
            .map(|index| cell(4 + index, "call address"))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            pointer_width,
            reflect_all,
            reflect_one,
            calls,
        })
    }
}

/// Descriptor field offsets announced by the module at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub size: usize,
    pub child: usize,
    pub len: usize,
    pub kind: usize,
    pub flags: usize,
}

/// Cells occupied by the handshake
pub const HANDSHAKE_CELLS: usize = 5;

impl Handshake {
    fn read(view: &MemoryView<'_>, at: usize) -> Result<Self> {
        let cell = |index: usize| -> Result<usize> {
            Ok(cell_integer(view.cell_f64(at + index * CELL)?, "handshake offset")? as usize)
        };
        Ok(Self {
            size: cell(0)?,
            child: cell(1)?,
            len: cell(2)?,
            kind: cell(3)?,
            flags: cell(4)?,
        })
    }

    /// Every field must fit inside the declared descriptor size
    pub fn validate(&self, pointer_width: usize) -> Result<()> {
        let fields = [
            ("child", self.child, pointer_width),
            ("len", self.len, 2),
            ("kind", self.kind, 1),
            ("flags", self.flags, 1),
        ];
        for (name, offset, width) in fields {
            if offset + width > self.size {
                return Err(Fault::mismatch(format!(
                    "{} field at {}+{} overruns {}-byte descriptor",
                    name, offset, width, self.size
                )));
            }
        }
        Ok(())
    }
}

/// One exported method as declared in the method table
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSpec {
    /// Index into the call table
    pub ordinal: usize,
    pub name: String,
    /// Type ids; index 0 is the return type
    pub ids: Vec<u32>,
    /// Callback slots this method may fill
    pub callback_slots: usize,
    /// First callback slot owned by this method
    pub callback_base: usize,
}

impl MethodSpec {
    #[inline]
    pub fn ret(&self) -> u32 {
        self.ids[0]
    }

    #[inline]
    pub fn params(&self) -> &[u32] {
        &self.ids[1..]
    }
}

/// Everything "reflect all" reports
#[derive(Debug, Clone)]
pub struct Discovery {
    pub handshake: Handshake,
    pub methods: Vec<MethodSpec>,
}

impl Discovery {
    /// Total callback slots across all methods
    pub fn callback_slots(&self) -> usize {
        self.methods.iter().map(|method| method.callback_slots).sum()
    }
}

/// Run the startup handshake and read the method table
pub fn discover(bridge: &dyn Bridge, header: &ModuleHeader, callbacks: &CallbackTable) -> Result<Discovery> {
    let scratch = bridge.scratch_offset();
    bridge.invoke(&Invocation {
        address: header.reflect_all,
        frame: scratch,
        callbacks,
        callback_slots: &[],
    })?;

    let view = MemoryView::acquire(bridge)?;
    let handshake = Handshake::read(&view, scratch)?;
    handshake.validate(header.pointer_width)?;

    let methods = read_methods(&view, scratch + HANDSHAKE_CELLS * CELL)?;
    if methods.len() != header.calls.len() {
        return Err(Fault::mismatch(format!(
            "method table lists {} methods, header lists {} calls",
            methods.len(),
            header.calls.len()
        )));
    }
    debug!(methods = methods.len(), descriptor_size = handshake.size, "handshake complete");

    Ok(Discovery { handshake, methods })
}

fn read_methods(view: &MemoryView<'_>, start: usize) -> Result<Vec<MethodSpec>> {
    let mut at = start;
    let mut next = || -> Result<u64> {
        let value = view.cell_f64(at)?;
        at += CELL;
        cell_integer(value, "method table cell")
    };

    let count = next()? as usize;
    let mut methods = Vec::with_capacity(count);
    let mut callback_base = 0;
    for ordinal in 0..count {
        let name_address = next()?;
        let name_len = next()? as usize;
        let callback_slots = next()? as usize;
        let arity = next()? as usize;
        if arity == 0 {
            return Err(Fault::mismatch(format!("method {} has no return type id", ordinal)));
        }
        let ids = (0..arity)
            .map(|_| next().and_then(type_id))
            .collect::<Result<Vec<_>>>()?;

        let offset = view.offset(name_address, name_len)?;
        let name = std::str::from_utf8(view.read(offset, name_len)?)
            .map_err(|_| Fault::mismatch(format!("method {} name is not UTF-8", ordinal)))?
            .to_string();

        methods.push(MethodSpec {
            ordinal,
            name,
            ids,
            callback_slots,
            callback_base,
        });
        callback_base += callback_slots;
    }
    Ok(methods)
}

/// Narrow a reflected value to a 32-bit type id
pub(crate) fn type_id(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Fault::mismatch(format!("type id {} exceeds 32 bits", value)))
}

/// Read a float cell that must hold an exact non-negative integer
pub(crate) fn cell_integer(value: f64, what: &str) -> Result<u64> {
    const LIMIT: f64 = 9_007_199_254_740_992.0; // 2^53
    if value.is_finite() && value >= 0.0 && value < LIMIT && value.fract() == 0.0 {
        Ok(value as u64)
    } else {
        Err(Fault::mismatch(format!("{} is not a valid integer cell: {}", what, value)))
    }
}

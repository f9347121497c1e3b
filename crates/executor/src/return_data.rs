use alloy_sol_types::SolError;
use devnet_primitives::{Bytes, U256};

// Built-in error types
// See <https://docs.soliditylang.org/en/v0.8.26/control-structures.html#error-handling-assert-require-revert-and-exceptions>
alloy_sol_types::sol! {
  error Error(string);
  error Panic(uint256);
}

/// Return data of a reverted execution.
pub struct ReturnData<'data> {
    value: &'data Bytes,
    selector: Option<[u8; 4]>,
}

impl<'data> ReturnData<'data> {
    /// Constructs a new instance from the provided return data.
    pub fn new(value: &'data Bytes) -> Self {
        let selector = value
            .get(0..4)
            .and_then(|selector| selector.try_into().ok());

        Self { value, selector }
    }

    /// Whether the return data is empty.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Whether the return data is an `Error(string)` payload.
    pub fn is_error_return_data(&self) -> bool {
        self.selector == Some(Error::SELECTOR)
    }

    /// Whether the return data is a `Panic(uint256)` payload.
    pub fn is_panic_return_data(&self) -> bool {
        self.selector == Some(Panic::SELECTOR)
    }

    /// Decodes the message of an `Error(string)` payload.
    pub fn decode_error(&self) -> Result<String, alloy_sol_types::Error> {
        Error::abi_decode(&self.value[..]).map(|error| error.0)
    }

    /// Decodes the error code of a `Panic(uint256)` payload.
    pub fn decode_panic(&self) -> Result<U256, alloy_sol_types::Error> {
        Panic::abi_decode(&self.value[..]).map(|panic| panic.0)
    }
}

/// Converts the return data of a reverted execution into a human-readable
/// reason, if it carries one.
pub fn revert_reason(output: &Bytes) -> Option<String> {
    let return_data = ReturnData::new(output);

    if return_data.is_error_return_data() {
        return_data.decode_error().ok()
    } else if return_data.is_panic_return_data() {
        return_data
            .decode_panic()
            .ok()
            .map(|code| format!("reverted with panic code {code:#x} ({})", panic_message(code)))
    } else {
        None
    }
}

fn panic_message(code: U256) -> &'static str {
    match code.saturating_to::<u64>() {
        0x01 => "Assertion error",
        0x11 => "Arithmetic operation overflowed outside of an unchecked block",
        0x12 => "Division or modulo division by zero",
        0x21 => "Tried to convert a value into an enum, but the value was too big or negative",
        0x22 => "Incorrectly encoded storage byte array",
        0x31 => ".pop() was called on an empty array",
        0x32 => "Array accessed at an out-of-bounds or negative index",
        0x41 => "Too much memory was allocated, or an array was created that is too large",
        0x51 => "Called a zero-initialized variable of internal function type",
        _ => "unknown panic code",
    }
}

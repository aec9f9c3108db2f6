//! Conversion of raw callback arguments into host types

use crate::types::{BridgeError, Message, MessageType, PlotRequest, Result};
use std::os::raw::c_char;

/// Copy a NUL-terminated native string into an owned `String`
///
/// Scans at most `max_len` bytes; a string without a terminator inside that
/// window is rejected rather than read further.
///
/// # Safety
/// `ptr` must be null or point to memory readable up to its NUL terminator
/// or `max_len` bytes, whichever comes first.
pub unsafe fn read_c_str(ptr: *const c_char, max_len: usize) -> Result<String> {
    if ptr.is_null() {
        return Err(BridgeError::Marshal("null string pointer".to_string()));
    }

    let bytes = ptr.cast::<u8>();
    let mut len = 0;
    while len < max_len {
        if unsafe { *bytes.add(len) } == 0 {
            let slice = unsafe { std::slice::from_raw_parts(bytes, len) };
            return String::from_utf8(slice.to_vec())
                .map_err(|e| BridgeError::Marshal(format!("text is not valid UTF-8: {}", e)));
        }
        len += 1;
    }

    Err(BridgeError::Marshal(format!(
        "string exceeds the {} byte payload limit",
        max_len
    )))
}

/// # Safety
/// See [`read_c_str`].
pub unsafe fn plot_request(params: *const c_char, max_len: usize) -> Result<PlotRequest> {
    let text = unsafe { read_c_str(params, max_len) }?;
    Ok(PlotRequest::new(text))
}

/// # Safety
/// See [`read_c_str`].
pub unsafe fn message(text: *const c_char, message_type: i32, max_len: usize) -> Result<Message> {
    let text = unsafe { read_c_str(text, max_len) }?;
    Ok(Message {
        text,
        kind: MessageType::from_raw(message_type),
    })
}

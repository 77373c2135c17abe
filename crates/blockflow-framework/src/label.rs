use crate::payload::Payload;

/// Metadata attached to a position in an element stream.
///
/// `index` counts elements from the start of the producing port's stream.
/// An input hands a label to the block's propagation hook once its consumed
/// element count passes that position.
#[derive(Debug, Clone)]
pub struct Label {
    pub id: String,
    pub data: Payload,
    pub index: u64,
}

impl Label {
    pub fn new(id: impl Into<String>, data: Payload, index: u64) -> Self {
        Self {
            id: id.into(),
            data,
            index,
        }
    }
}

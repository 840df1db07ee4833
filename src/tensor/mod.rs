//! Tensor views over buffers
//!
//! A [`TensorView`] overlays a [`Layout`] (shape, strides and memory order)
//! on a [`Buffer`](crate::runtime::Buffer). It never owns or copies element
//! data: reads and writes through a view go straight to the buffer.

mod layout;
mod view;

pub(crate) use layout::checked_elem_count;
pub use layout::{Layout, MemoryOrder, Shape, Strides};
pub use view::TensorView;

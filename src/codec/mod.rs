//! Image codec - decoding uploads into bitmaps and encoding results for transport

pub mod base64;
pub mod raster;

pub use raster::{decode, decode_all, encode, encode_png, Bitmap, DecodeError};

pub mod atomic;
pub mod fits;
pub mod image_io;
pub mod naming;
pub mod ser;

pub use atomic::write_atomically;
pub use fits::{read_fits, write_fits_u16, FitsHeader, FitsImage, HeaderValue};
pub use image_io::{load_image, to_display_u8, to_scientific_u16};
pub use ser::SerReader;

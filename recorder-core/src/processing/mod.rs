pub mod pcm;
pub mod pixel_convert;
pub mod rescale;

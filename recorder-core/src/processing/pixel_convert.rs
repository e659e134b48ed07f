/// Raw video pixel layout conversion.
///
/// All buffers are tightly packed (alignment 1). Packed RGB is converted to
/// planar YUV with the BT.601 limited-range integer coefficients, chroma taken
/// from the average of each 2x2 block.
use crate::models::error::RecorderError;
use crate::models::formats::PixelFormat;

/// Whether `from → to` is a conversion this module can perform.
pub fn is_supported(from: PixelFormat, to: PixelFormat) -> bool {
    from == to
        || matches!(
            (from, to),
            (PixelFormat::Nv12, PixelFormat::Yuv420p)
                | (PixelFormat::Yuv420p, PixelFormat::Nv12)
                | (PixelFormat::Rgb24 | PixelFormat::Bgra | PixelFormat::Argb, PixelFormat::Yuv420p)
        )
}

/// Convert one frame into a freshly allocated buffer in `to` layout.
pub fn convert(
    src: &[u8],
    from: PixelFormat,
    to: PixelFormat,
    width: usize,
    height: usize,
) -> Result<Vec<u8>, RecorderError> {
    let mut dst = vec![0u8; to.buffer_size(width, height)];
    convert_into(src, from, &mut dst, to, width, height)?;
    Ok(dst)
}

/// Convert one frame into `dst`, which must be exactly one `to` frame long.
pub fn convert_into(
    src: &[u8],
    from: PixelFormat,
    dst: &mut [u8],
    to: PixelFormat,
    width: usize,
    height: usize,
) -> Result<(), RecorderError> {
    let expected = from.buffer_size(width, height);
    if src.len() != expected {
        return Err(RecorderError::BufferSizeMismatch {
            expected,
            actual: src.len(),
        });
    }
    let expected = to.buffer_size(width, height);
    if dst.len() != expected {
        return Err(RecorderError::BufferSizeMismatch {
            expected,
            actual: dst.len(),
        });
    }

    match (from, to) {
        (a, b) if a == b => dst.copy_from_slice(src),
        (PixelFormat::Nv12, PixelFormat::Yuv420p) => nv12_to_yuv420p(src, dst, width, height),
        (PixelFormat::Yuv420p, PixelFormat::Nv12) => yuv420p_to_nv12(src, dst, width, height),
        (rgb, PixelFormat::Yuv420p) if rgb.is_packed_rgb() => rgb_to_yuv420p(src, rgb, dst, width, height),
        _ => {
            return Err(RecorderError::UnsupportedPixelFormat(format!("{} -> {}", from, to)));
        }
    }
    Ok(())
}

fn nv12_to_yuv420p(src: &[u8], dst: &mut [u8], width: usize, height: usize) {
    let luma = width * height;
    let chroma = width.div_ceil(2) * height.div_ceil(2);

    dst[..luma].copy_from_slice(&src[..luma]);
    let (u_plane, v_plane) = dst[luma..].split_at_mut(chroma);
    for (i, uv) in src[luma..].chunks_exact(2).enumerate() {
        u_plane[i] = uv[0];
        v_plane[i] = uv[1];
    }
}

fn yuv420p_to_nv12(src: &[u8], dst: &mut [u8], width: usize, height: usize) {
    let luma = width * height;
    let chroma = width.div_ceil(2) * height.div_ceil(2);

    dst[..luma].copy_from_slice(&src[..luma]);
    let u_plane = &src[luma..luma + chroma];
    let v_plane = &src[luma + chroma..];
    for (i, uv) in dst[luma..].chunks_exact_mut(2).enumerate() {
        uv[0] = u_plane[i];
        uv[1] = v_plane[i];
    }
}

/// Byte offsets of R, G, B inside one packed pixel, plus the pixel size.
fn rgb_offsets(format: PixelFormat) -> (usize, usize, usize, usize) {
    match format {
        PixelFormat::Rgb24 => (0, 1, 2, 3),
        PixelFormat::Bgra => (2, 1, 0, 4),
        PixelFormat::Argb => (1, 2, 3, 4),
        PixelFormat::Yuv420p | PixelFormat::Nv12 => unreachable!("not a packed RGB format"),
    }
}

fn luma(r: i32, g: i32, b: i32) -> u8 {
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8
}

fn chroma_u(r: i32, g: i32, b: i32) -> u8 {
    (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

fn chroma_v(r: i32, g: i32, b: i32) -> u8 {
    (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

fn rgb_to_yuv420p(src: &[u8], format: PixelFormat, dst: &mut [u8], width: usize, height: usize) {
    let (r_off, g_off, b_off, bpp) = rgb_offsets(format);
    let chroma_w = width.div_ceil(2);
    let chroma_h = height.div_ceil(2);

    let (y_plane, rest) = dst.split_at_mut(width * height);
    let (u_plane, v_plane) = rest.split_at_mut(chroma_w * chroma_h);

    let pixel = |x: usize, y: usize| -> (i32, i32, i32) {
        let p = (y * width + x) * bpp;
        (src[p + r_off] as i32, src[p + g_off] as i32, src[p + b_off] as i32)
    };

    for y in 0..height {
        for x in 0..width {
            let (r, g, b) = pixel(x, y);
            y_plane[y * width + x] = luma(r, g, b);
        }
    }

    for cy in 0..chroma_h {
        for cx in 0..chroma_w {
            let (mut r, mut g, mut b, mut n) = (0i32, 0i32, 0i32, 0i32);
            for y in (cy * 2)..(cy * 2 + 2).min(height) {
                for x in (cx * 2)..(cx * 2 + 2).min(width) {
                    let (pr, pg, pb) = pixel(x, y);
                    r += pr;
                    g += pg;
                    b += pb;
                    n += 1;
                }
            }
            let (r, g, b) = ((r + n / 2) / n, (g + n / 2) / n, (b + n / 2) / n);
            u_plane[cy * chroma_w + cx] = chroma_u(r, g, b);
            v_plane[cy * chroma_w + cx] = chroma_v(r, g, b);
        }
    }
}

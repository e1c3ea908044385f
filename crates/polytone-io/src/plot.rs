use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};

use polytone_core::Channel;

const BACKGROUND: Rgba<u8> = Rgba([24, 24, 24, 255]);
const GRID: Rgba<u8> = Rgba([56, 56, 56, 255]);
const DIAGONAL: Rgba<u8> = Rgba([88, 88, 88, 255]);

fn channel_color(channel: Channel) -> Rgba<u8> {
    match channel {
        Channel::Red => Rgba([235, 80, 80, 255]),
        Channel::Green => Rgba([80, 210, 110, 255]),
        Channel::Blue => Rgba([90, 140, 245, 255]),
    }
}

/// Draw sampled curves (evenly spaced over [0,1], values in [0,1]) into a
/// square plot with a quarter grid and the identity diagonal.
pub fn render_curve_plot(curves: &[(Channel, Vec<f32>)], size: u32) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(size, size, BACKGROUND);
    if size < 2 {
        return img;
    }
    let last = (size - 1) as f32;

    for q in 1..4 {
        let p = (last * q as f32 / 4.0).round() as u32;
        for t in 0..size {
            img.put_pixel(p, t, GRID);
            img.put_pixel(t, p, GRID);
        }
    }
    draw_line(&mut img, (0.0, last), (last, 0.0), DIAGONAL);

    for (channel, samples) in curves {
        let color = channel_color(*channel);
        let to_px = |i: usize, v: f32| {
            let x = if samples.len() > 1 {
                i as f32 / (samples.len() - 1) as f32
            } else {
                0.0
            };
            (x * last, (1.0 - v.clamp(0.0, 1.0)) * last)
        };
        match samples.as_slice() {
            [] => {}
            [only] => {
                let p = to_px(0, *only);
                draw_line(&mut img, p, p, color);
            }
            _ => {
                for (i, pair) in samples.windows(2).enumerate() {
                    draw_line(&mut img, to_px(i, pair[0]), to_px(i + 1, pair[1]), color);
                }
            }
        }
    }
    img
}

pub fn save_curve_plot(curves: &[(Channel, Vec<f32>)], size: u32, path: &Path) -> Result<()> {
    render_curve_plot(curves, size)
        .save(path)
        .with_context(|| format!("failed to write curve plot: {}", path.display()))
}

fn draw_line(img: &mut RgbaImage, from: (f32, f32), to: (f32, f32), color: Rgba<u8>) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as u32;
    for s in 0..=steps {
        let t = s as f32 / steps as f32;
        let x = (from.0 + dx * t).round() as u32;
        let y = (from.1 + dy * t).round() as u32;
        if x < img.width() && y < img.height() {
            img.put_pixel(x, y, color);
        }
    }
}

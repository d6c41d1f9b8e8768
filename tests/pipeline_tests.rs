use image::{Rgba, RgbaImage};
use pidash::config::{CropMode, DisplaySettings, EnhancementSettings, Orientation};
use pidash::processing::pipeline::crop_and_resize;
use pidash::processing::{RenderSettings, render};

const RED: Rgba<u8> = Rgba([220, 20, 20, 255]);
const BLUE: Rgba<u8> = Rgba([20, 20, 220, 255]);

fn is_red(p: &Rgba<u8>) -> bool {
    p.0[0] > 150 && p.0[2] < 100
}

fn is_blue(p: &Rgba<u8>) -> bool {
    p.0[2] > 150 && p.0[0] < 100
}

fn checker(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        let v = if (x / 7 + y / 5) % 2 == 0 { 40 } else { 210 };
        Rgba([v, 255 - v, (x % 256) as u8, 255])
    })
}

#[test]
fn square_source_fills_wide_target_exactly() {
    let out = render(&checker(1000, 1000), &RenderSettings::new(800, 400)).unwrap();
    assert_eq!(out.dimensions(), (800, 400));
}

#[test]
fn identity_enhancement_matches_plain_crop_and_resize() {
    let src = checker(640, 480);
    let settings = RenderSettings::new(300, 300);
    assert!(settings.enhancement.is_identity());
    let rendered = render(&src, &settings).unwrap();
    let plain = crop_and_resize(&src, 300, 300, CropMode::Center).unwrap();
    assert_eq!(rendered, plain);
}

#[test]
fn portrait_rotates_counter_clockwise_before_cropping() {
    // Left half red, right half blue.
    let src = RgbaImage::from_fn(400, 200, |x, _| if x < 200 { RED } else { BLUE });
    let settings = RenderSettings {
        orientation: Orientation::Portrait,
        ..RenderSettings::new(300, 600)
    };
    let out = render(&src, &settings).unwrap();
    assert_eq!(out.dimensions(), (300, 600));
    assert!(is_blue(out.get_pixel(150, 20)));
    assert!(is_red(out.get_pixel(150, 580)));
}

#[test]
fn inverted_output_is_rotated_half_turn() {
    // Top half red, bottom half blue; same size as the target so no resampling.
    let src = RgbaImage::from_fn(120, 80, |_, y| if y < 40 { RED } else { BLUE });
    let settings = RenderSettings {
        inverted: true,
        ..RenderSettings::new(120, 80)
    };
    let out = render(&src, &settings).unwrap();
    assert_eq!(*out.get_pixel(10, 5), BLUE);
    assert_eq!(*out.get_pixel(10, 75), RED);
}

#[test]
fn keep_width_crop_keeps_left_edge() {
    // Only the leftmost quarter is red.
    let src = RgbaImage::from_fn(400, 100, |x, _| if x < 100 { RED } else { BLUE });
    let centered = render(&src, &RenderSettings::new(100, 100)).unwrap();
    assert_eq!(*centered.get_pixel(50, 50), BLUE);

    let left = render(
        &src,
        &RenderSettings {
            crop_mode: CropMode::KeepWidth,
            ..RenderSettings::new(100, 100)
        },
    )
    .unwrap();
    assert_eq!(*left.get_pixel(50, 50), RED);
}

#[test]
fn enhancement_runs_after_geometry() {
    let src = RgbaImage::from_pixel(50, 50, Rgba([100, 100, 100, 255]));
    let settings = RenderSettings {
        enhancement: EnhancementSettings::try_new(0.0, 1.0, 1.0, 1.0).unwrap(),
        ..RenderSettings::new(20, 10)
    };
    let out = render(&src, &settings).unwrap();
    assert_eq!(out.dimensions(), (20, 10));
    assert!(out.pixels().all(|p| p.0 == [0, 0, 0, 255]));
}

#[test]
fn configured_resolution_overrides_sink_resolution() {
    let display = DisplaySettings {
        resolution: Some((640, 384)),
        ..DisplaySettings::default()
    };
    let settings = RenderSettings::from_display(&display, (800, 480));
    assert_eq!((settings.width, settings.height), (640, 384));

    let fallback = RenderSettings::from_display(&DisplaySettings::default(), (800, 480));
    assert_eq!((fallback.width, fallback.height), (800, 480));
}

#[test]
fn zero_target_resolution_is_an_error() {
    assert!(render(&checker(10, 10), &RenderSettings::new(0, 10)).is_err());
}

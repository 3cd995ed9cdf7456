use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_polygon_mut,
};
use imageproc::point::Point;
use imageproc::rect::Rect;
use tomato_shared::ClassifiedTomato;

use super::crop::PixelRect;
use super::font::LabelFont;
use crate::segmentation::Detection;

/// Vertical distance between a label's anchor and the top of its box.
pub const LABEL_OFFSET: i32 = 24;

/// Box and outline colors, assigned by detection position.
pub const INSTANCE_PALETTE: [Rgb<u8>; 8] = [
    Rgb([129, 140, 248]),
    Rgb([96, 165, 250]),
    Rgb([52, 211, 153]),
    Rgb([251, 191, 36]),
    Rgb([248, 113, 113]),
    Rgb([244, 114, 182]),
    Rgb([56, 189, 248]),
    Rgb([34, 197, 94]),
];

pub const DEFAULT_CLASS_COLOR: Rgb<u8> = Rgb([59, 130, 246]);

pub fn class_color(class: &str) -> Rgb<u8> {
    match class {
        "Ripe" => Rgb([34, 197, 94]),
        "Unripe" => Rgb([250, 204, 21]),
        "Old" => Rgb([249, 115, 22]),
        "Damaged" => Rgb([248, 113, 113]),
        _ => DEFAULT_CLASS_COLOR,
    }
}

pub fn instance_color(index: usize) -> Rgb<u8> {
    INSTANCE_PALETTE[index % INSTANCE_PALETTE.len()]
}

pub fn label_text(index: usize, tomato: &ClassifiedTomato) -> String {
    format!("Tomato #{} - {} ({:.2})", index + 1, tomato.class, tomato.prob)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub color: Rgb<u8>,
}

/// Everything drawn for one detection.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceAnnotation {
    pub rect: PixelRect,
    pub color: Rgb<u8>,
    pub label: Label,
    pub outline: Option<Vec<(f32, f32)>>,
}

/// Lays out one annotation per tomato, in order. `detections[i]` supplies
/// the outline for `tomatoes[i]`; tomatoes past the end of `detections`, or
/// whose detection has fewer than two vertices, get no outline.
pub fn plan(tomatoes: &[ClassifiedTomato], detections: &[Detection]) -> Vec<InstanceAnnotation> {
    tomatoes
        .iter()
        .enumerate()
        .map(|(i, tomato)| {
            let rect = PixelRect::from_center(&tomato.bbox);
            let outline = detections
                .get(i)
                .filter(|d| d.points.len() >= 2)
                .map(|d| d.points.iter().map(|p| (p.x, p.y)).collect());

            InstanceAnnotation {
                rect,
                color: instance_color(i),
                label: Label {
                    text: label_text(i, tomato),
                    x: rect.left,
                    y: rect.top.saturating_sub(LABEL_OFFSET).max(0),
                    color: class_color(&tomato.class),
                },
                outline,
            }
        })
        .collect()
}

pub struct Annotator {
    font: LabelFont,
    stroke_width: u32,
}

impl Annotator {
    pub fn new(font: LabelFont, stroke_width: u32) -> Self {
        Self {
            font,
            stroke_width: stroke_width.max(1),
        }
    }

    /// Returns an annotated copy of `image`.
    pub fn annotate(
        &self,
        image: &RgbImage,
        tomatoes: &[ClassifiedTomato],
        detections: &[Detection],
    ) -> RgbImage {
        self.render(image, &plan(tomatoes, detections))
    }

    pub fn render(&self, image: &RgbImage, annotations: &[InstanceAnnotation]) -> RgbImage {
        let mut canvas = image.clone();
        for annotation in annotations {
            self.stroke_rect(&mut canvas, annotation.rect, annotation.color);
            let label = &annotation.label;
            self.font
                .draw(&mut canvas, label.x, label.y, label.color, &label.text);
            if let Some(points) = &annotation.outline {
                self.stroke_closed(&mut canvas, points, annotation.color);
            }
        }
        canvas
    }

    // Corners are inclusive; the stroke grows inward. Edges far outside the
    // canvas are pulled in to a margin of twice the stroke, which leaves
    // every visible pixel unchanged.
    fn stroke_rect(&self, canvas: &mut RgbImage, rect: PixelRect, color: Rgb<u8>) {
        let margin = 2 * self.stroke_width as i64;
        let left = (rect.left as i64).max(-margin);
        let top = (rect.top as i64).max(-margin);
        let right = (rect.right as i64).min(canvas.width() as i64 + margin);
        let bottom = (rect.bottom as i64).min(canvas.height() as i64 + margin);

        let width = right - left + 1;
        let height = bottom - top + 1;
        for inset in 0..self.stroke_width as i64 {
            let w = width - 2 * inset;
            let h = height - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let outline = Rect::at((left + inset) as i32, (top + inset) as i32)
                .of_size(w as u32, h as u32);
            draw_hollow_rect_mut(canvas, outline, color);
        }
    }

    fn stroke_closed(&self, canvas: &mut RgbImage, points: &[(f32, f32)], color: Rgb<u8>) {
        let closing = points.first().copied();
        let path: Vec<(f32, f32)> = points.iter().copied().chain(closing).collect();
        let margin = 2.0 * self.stroke_width as f32;
        let bounds = (
            -margin,
            -margin,
            canvas.width() as f32 + margin,
            canvas.height() as f32 + margin,
        );

        for pair in path.windows(2) {
            if let Some((start, end)) = clip_segment(pair[0], pair[1], bounds) {
                self.stroke_segment(canvas, start, end, color);
            }
        }
        if self.stroke_width > 1 {
            let radius = (self.stroke_width / 2) as i32;
            for &(x, y) in points {
                if x >= bounds.0 && x <= bounds.2 && y >= bounds.1 && y <= bounds.3 {
                    draw_filled_circle_mut(canvas, (x.round() as i32, y.round() as i32), radius, color);
                }
            }
        }
    }

    fn stroke_segment(
        &self,
        canvas: &mut RgbImage,
        start: (f32, f32),
        end: (f32, f32),
        color: Rgb<u8>,
    ) {
        if self.stroke_width <= 1 {
            draw_line_segment_mut(canvas, start, end, color);
            return;
        }

        let (dx, dy) = (end.0 - start.0, end.1 - start.1);
        let length = (dx * dx + dy * dy).sqrt();
        if !length.is_finite() || length < f32::EPSILON {
            return;
        }

        let half = self.stroke_width as f32 / 2.0;
        let (nx, ny) = (-dy / length * half, dx / length * half);
        let corner = |(x, y): (f32, f32), sign: f32| {
            Point::new((x + sign * nx).round() as i32, (y + sign * ny).round() as i32)
        };
        let quad = [
            corner(start, 1.0),
            corner(end, 1.0),
            corner(end, -1.0),
            corner(start, -1.0),
        ];
        draw_polygon_mut(canvas, &quad, color);
    }
}

/// Liang-Barsky clip of a segment to `(min_x, min_y, max_x, max_y)`.
/// Computed in f64 so far-away endpoints keep sub-pixel precision.
fn clip_segment(
    start: (f32, f32),
    end: (f32, f32),
    (min_x, min_y, max_x, max_y): (f32, f32, f32, f32),
) -> Option<((f32, f32), (f32, f32))> {
    if ![start.0, start.1, end.0, end.1].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (sx, sy) = (start.0 as f64, start.1 as f64);
    let (dx, dy) = (end.0 as f64 - sx, end.1 as f64 - sy);
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [
        (-dx, sx - min_x as f64),
        (dx, max_x as f64 - sx),
        (-dy, sy - min_y as f64),
        (dy, max_y as f64 - sy),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return None;
        }
    }
    let at = |t: f64| ((sx + t * dx) as f32, (sy + t * dy) as f32);
    Some((at(t0), at(t1)))
}

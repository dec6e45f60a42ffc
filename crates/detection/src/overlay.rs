//! Status overlay rendering

use crate::pipeline::PipelineStatus;
use frame_source::VideoFrame;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

const STRIP_HEIGHT: u32 = 12;
const BAR_HEIGHT: u32 = 6;
const BAR_MARGIN: u32 = 4;

const GREEN: Rgb<u8> = Rgb([0, 200, 0]);
const ORANGE: Rgb<u8> = Rgb([255, 140, 0]);
const RED: Rgb<u8> = Rgb([220, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Draw the monitoring status onto a copy of the frame: a colored strip at
/// the top (green/orange/red with rising drowsiness, red while the alert is
/// up) and a progress bar tracking how close the suspect timer is to firing.
///
/// Frames too small to carry the overlay are returned unchanged.
pub fn draw_status_overlay(frame: &VideoFrame, status: &PipelineStatus) -> VideoFrame {
    if frame.width < 2 * BAR_MARGIN + 2 || frame.height < STRIP_HEIGHT + BAR_HEIGHT + 2 * BAR_MARGIN
    {
        return frame.clone();
    }

    let Some(mut img) = RgbImage::from_raw(frame.width, frame.height, frame.data.clone()) else {
        return frame.clone();
    };

    let strip_color = if status.alert_active || status.drowsy_ratio > 0.7 {
        RED
    } else if status.drowsy_ratio > 0.3 {
        ORANGE
    } else {
        GREEN
    };
    draw_filled_rect_mut(
        &mut img,
        Rect::at(0, 0).of_size(frame.width, STRIP_HEIGHT),
        strip_color,
    );

    if status.alert_progress > 0.0 {
        let track_width = frame.width - 2 * BAR_MARGIN;
        let y = (STRIP_HEIGHT + BAR_MARGIN) as i32;

        draw_filled_rect_mut(
            &mut img,
            Rect::at(BAR_MARGIN as i32, y).of_size(track_width, BAR_HEIGHT),
            WHITE,
        );
        let fill = ((track_width as f32 * status.alert_progress.clamp(0.0, 1.0)) as u32).max(1);
        draw_filled_rect_mut(
            &mut img,
            Rect::at(BAR_MARGIN as i32, y).of_size(fill, BAR_HEIGHT),
            ORANGE,
        );
    }

    VideoFrame::new(
        frame.id,
        img.into_raw(),
        frame.width,
        frame.height,
        frame.captured_at_ms,
    )
}

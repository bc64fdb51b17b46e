//! Control window for the pitch shifter: two sliders writing through to
//! the engine's shared parameter block.

use std::sync::Arc;

use eframe::egui;
use pitcher_audio::{ShiftParams, PITCH_RANGE};

pub struct PitcherApp {
    params: Arc<ShiftParams>,
}

impl PitcherApp {
    pub fn new(params: Arc<ShiftParams>) -> Self {
        Self { params }
    }
}

impl eframe::App for PitcherApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Pitcher");
            ui.add_space(8.0);

            let mut pitch = self.params.pitch();
            ui.label(format!("Pitch = {pitch:.2}"));
            if ui
                .add(
                    egui::Slider::new(&mut pitch, -PITCH_RANGE..=PITCH_RANGE)
                        .step_by(0.01)
                        .show_value(false),
                )
                .changed()
            {
                self.params.set_pitch(pitch);
            }

            ui.add_space(8.0);

            let mut volume = self.params.volume();
            ui.label(format!("Volume = {volume:.1}"));
            if ui
                .add(
                    egui::Slider::new(&mut volume, 0.0..=1.0)
                        .step_by(0.01)
                        .show_value(false),
                )
                .changed()
            {
                self.params.set_volume(volume);
            }
        });
    }
}

/// Open the control window and run it to close. Blocks the calling
/// thread; window lifetime is process lifetime when the GUI is enabled.
pub fn run(params: Arc<ShiftParams>) -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Pitcher")
            .with_inner_size([800.0, 200.0])
            .with_min_inner_size([400.0, 160.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Pitcher",
        options,
        Box::new(move |_cc| Ok(Box::new(PitcherApp::new(params)))),
    )
}

use std::cell::{Cell, RefCell};
use std::f64::consts::PI;
use std::rc::Rc;

use gtk::glib::{self, ControlFlow, SourceId};
use gtk::prelude::*;
use gtk4 as gtk;
use ipax_core::LinkState;

const DOT_SIZE: i32 = 16;

/// Connection dot next to the connect buttons. Blinks while connected, with
/// the rate telling how fast the last probe answered.
#[derive(Clone)]
pub(crate) struct StatusIndicator {
    pub(crate) area: gtk::DrawingArea,
    state: Rc<Cell<LinkState>>,
    lit: Rc<Cell<bool>>,
    timer: Rc<RefCell<Option<SourceId>>>,
}

impl StatusIndicator {
    pub(crate) fn new() -> Self {
        let area = gtk::DrawingArea::builder()
            .content_width(DOT_SIZE)
            .content_height(DOT_SIZE)
            .valign(gtk::Align::Center)
            .build();
        let state = Rc::new(Cell::new(LinkState::Disconnected));
        let lit = Rc::new(Cell::new(true));

        let state_draw = state.clone();
        let lit_draw = lit.clone();
        area.set_draw_func(move |_, cr, width, height| {
            if !lit_draw.get() {
                return;
            }
            let (r, g, b) = state_draw.get().rgb();
            let radius = f64::from(width.min(height)) / 2.0 - 1.0;
            cr.set_source_rgb(r, g, b);
            cr.arc(
                f64::from(width) / 2.0,
                f64::from(height) / 2.0,
                radius.max(1.0),
                0.0,
                2.0 * PI,
            );
            let _ = cr.fill();
        });

        let indicator = Self {
            area,
            state,
            lit,
            timer: Rc::new(RefCell::new(None)),
        };
        indicator.set_state(LinkState::Disconnected);
        indicator
    }

    pub(crate) fn set_state(&self, state: LinkState) {
        self.state.set(state);
        self.lit.set(true);
        if let Some(timer) = self.timer.borrow_mut().take() {
            timer.remove();
        }
        self.area
            .set_tooltip_text(Some(&format!("SSH: {}", state.label())));

        if let Some(interval) = state.blink_interval() {
            let area = self.area.clone();
            let lit = self.lit.clone();
            let id = glib::timeout_add_local(interval, move || {
                lit.set(!lit.get());
                area.queue_draw();
                ControlFlow::Continue
            });
            *self.timer.borrow_mut() = Some(id);
        }
        self.area.queue_draw();
    }
}

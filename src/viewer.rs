use std::sync::Arc;

use eframe::CreationContext;
use egui::{vec2, Button, CentralPanel, Grid, RichText, ScrollArea, TextEdit, TextureHandle, TopBottomPanel};
use hashbrown::HashMap;
use url::Url;

use crate::{
    config::{MatrixConfig, ViewerConfig},
    MatrixMedia, Size, ThumbnailBridge,
};

mod loader;
pub use loader::Loader;

pub trait Repaint: Sized + Send + Sync + 'static {
    fn repaint(&self) {}

    fn erased(self) -> ErasedRepaint {
        Arc::new(move || self.repaint())
    }
}

impl Repaint for () {}

impl Repaint for egui::Context {
    fn repaint(&self) {
        self.request_repaint();
    }
}

pub type ErasedRepaint = Arc<dyn Fn() + Send + Sync + 'static>;

enum Slot {
    Loading,
    Ready { texture: TextureHandle, size: Size },
    Missing,
}

pub struct Viewer {
    bridge: Arc<ThumbnailBridge>,
    http: reqwest::Client,
    loader: Loader,
    size: Size,
    ids: Vec<String>,
    slots: HashMap<String, Slot>,
    homeserver: String,
    access_token: Option<String>,
    new_id: String,
    status: Option<String>,
}

impl Viewer {
    pub fn create(
        cc: &CreationContext,
        bridge: Arc<ThumbnailBridge>,
        http: reqwest::Client,
        config: &ViewerConfig,
        matrix: Option<MatrixConfig>,
    ) -> Box<dyn eframe::App> {
        let loader = Loader::create(
            bridge.clone(),
            config.size,
            config.loaders,
            cc.egui_ctx.clone(),
        );

        let (homeserver, access_token) = matrix
            .map(|m| (m.homeserver.to_string(), m.access_token))
            .unwrap_or_default();

        let mut this = Self {
            bridge,
            http,
            loader,
            size: config.size,
            ids: Vec::new(),
            slots: HashMap::new(),
            homeserver,
            access_token,
            new_id: String::new(),
            status: None,
        };

        for id in &config.ids {
            this.add(id);
        }

        Box::new(this)
    }

    fn add(&mut self, id: &str) {
        let id = id.trim();
        if id.is_empty() || self.slots.contains_key(id) {
            return;
        }
        self.ids.push(id.to_string());
        self.slots.insert(id.to_string(), Slot::Loading);
        self.loader.request(id);
    }

    fn reload(&mut self) {
        self.loader.reset();
        for id in &self.ids {
            self.slots.insert(id.clone(), Slot::Loading);
            self.loader.request(id);
        }
    }

    fn connect(&mut self) {
        let homeserver = self.homeserver.trim();
        if homeserver.is_empty() {
            self.bridge.set_backend(None);
            self.status = Some("disconnected".to_string());
            return;
        }

        match media_for(&self.http, homeserver, self.access_token.as_deref()) {
            Ok(media) => {
                self.status = Some(format!("using {}", media.homeserver()));
                self.bridge.set_backend(Some(Arc::new(media)));
                self.reload();
            }
            Err(err) => self.status = Some(err),
        }
    }

    fn poll(&mut self, ctx: &egui::Context) {
        while let Some((id, thumbnail)) = self.loader.poll() {
            let slot = match thumbnail {
                Some(thumbnail) => Slot::Ready {
                    texture: thumbnail.load_texture(ctx, &id),
                    size: thumbnail.size(),
                },
                None => Slot::Missing,
            };
            self.slots.insert(id, slot);
        }
    }

    fn display_top_bar(&mut self, ctx: &egui::Context) {
        TopBottomPanel::top("top").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("homeserver");
                let resp = ui.add(
                    TextEdit::singleline(&mut self.homeserver).hint_text("https://matrix.org"),
                );
                let enter = resp.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.button("connect").clicked() || enter {
                    self.connect();
                }
                if ui.button("reload").clicked() {
                    self.reload();
                }
            });

            ui.horizontal(|ui| {
                ui.label("media id");
                ui.add(TextEdit::singleline(&mut self.new_id).hint_text("mxc://server/media"));
                let can_add = !self.new_id.trim().is_empty();
                if ui.add_enabled(can_add, Button::new("add")).clicked() {
                    let id = std::mem::take(&mut self.new_id);
                    self.add(&id);
                }
            });

            if let Some(status) = &self.status {
                ui.label(RichText::new(status).weak());
            }
        });
    }

    fn display_thumbnails(&self, ctx: &egui::Context) {
        let cell = cell_size(self.size);
        CentralPanel::default().show(ctx, |ui| {
            ScrollArea::vertical().show(ui, |ui| {
                Grid::new("thumbnails").striped(true).show(ui, |ui| {
                    for id in &self.ids {
                        ui.monospace(id);
                        match self.slots.get(id) {
                            Some(Slot::Ready { texture, size }) => {
                                let dim = vec2(size.width as f32, size.height as f32);
                                ui.add(egui::Image::new(texture, dim))
                                    .on_hover_text(size.to_string());
                            }
                            Some(Slot::Missing) => {
                                let label = egui::Label::new(RichText::new("no thumbnail").weak());
                                ui.add_sized(cell, label);
                            }
                            Some(Slot::Loading) | None => {
                                ui.add_sized(cell, egui::Spinner::new());
                            }
                        }
                        ui.end_row();
                    }
                });
            });
        });
    }
}

fn cell_size(size: Size) -> egui::Vec2 {
    vec2(size.width.max(1) as f32, size.height.max(1) as f32)
}

fn media_for(
    http: &reqwest::Client,
    homeserver: &str,
    access_token: Option<&str>,
) -> Result<MatrixMedia, String> {
    match Url::parse(homeserver) {
        Ok(url) if !url.cannot_be_a_base() => Ok(MatrixMedia::new(
            http.clone(),
            url,
            access_token.map(ToString::to_string),
        )),
        Ok(..) => Err(format!("'{homeserver}' is not a base url")),
        Err(err) => Err(format!("invalid url '{homeserver}': {err}")),
    }
}

impl eframe::App for Viewer {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll(ctx);
        self.display_top_bar(ctx);
        self.display_thumbnails(ctx);
    }
}

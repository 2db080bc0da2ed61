use crate::capability::Variant;
use crate::error::SurfaceError;
use crate::media::MediaHandle;
use crate::utils::random_id;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Something a media handle can be rendered on.
pub trait Surface {
    /// Generic source-object slot (standard variant).
    fn set_src_object(&mut self, media: &MediaHandle);
    /// Vendor source-object slot (`Moz` variant).
    fn set_vendor_src_object(&mut self, media: &MediaHandle);
    /// URL source (`Webkit` variant).
    fn set_src(&mut self, url: &str);
    fn play(&mut self) -> Result<(), SurfaceError>;
}

/// `blob:` URLs standing in for media handles.
#[derive(Debug, Default)]
pub struct ObjectUrls {
    urls: Mutex<HashMap<String, MediaHandle>>,
}

impl ObjectUrls {
    pub const SCHEME: &'static str = "blob:";

    pub fn create(&self, media: &MediaHandle) -> String {
        let url = format!("{}media/{}", Self::SCHEME, random_id());
        self.urls.lock().insert(url.clone(), media.clone());
        url
    }

    pub fn resolve(&self, url: &str) -> Option<MediaHandle> {
        self.urls.lock().get(url).cloned()
    }

    pub fn revoke(&self, url: &str) -> bool {
        self.urls.lock().remove(url).is_some()
    }
}

/// Attach strategy, fixed once from the detected capture variant.
#[derive(Debug)]
pub enum Presenter {
    Standard,
    Moz,
    Webkit(ObjectUrls),
}

impl Presenter {
    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Standard => Presenter::Standard,
            Variant::Moz => Presenter::Moz,
            Variant::Webkit => Presenter::Webkit(ObjectUrls::default()),
        }
    }

    /// Binds `media` to `surface`. Playback failures are only logged.
    pub fn play(&self, media: &MediaHandle, surface: &mut dyn Surface) {
        let started = match self {
            Presenter::Standard => {
                surface.set_src_object(media);
                surface.play()
            }
            Presenter::Moz => {
                surface.set_vendor_src_object(media);
                surface.play()
            }
            Presenter::Webkit(urls) => {
                let url = urls.create(media);
                tracing::debug!("media {} bound to {}", media.id, url);
                surface.set_src(&url);
                Ok(())
            }
        };

        if let Err(e) = started {
            tracing::warn!("failed to play media {}: {}", media.id, e);
        }
    }

    pub fn object_urls(&self) -> Option<&ObjectUrls> {
        match self {
            Presenter::Webkit(urls) => Some(urls),
            Presenter::Standard | Presenter::Moz => None,
        }
    }
}

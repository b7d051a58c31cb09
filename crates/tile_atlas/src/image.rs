//! `Image`: an ordered mip-element chain plus the rendered/assembled
//! distinction.

use render_protocol::Colorspace;

use crate::mip_element::ImageMipElement;

/// Monotonically assigned identity, invalidated once the backing [`Image`]
/// is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(u64);

impl ImageId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// A render-tag identifying the `VirtualBuffer` index a rendered image's
/// content is produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTag(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Backed by a `VirtualBuffer` render job; may not be sampled until that
    /// buffer is finished and blitted.
    Rendered { render_tag: RenderTag },
    /// Structural only: tiles borrowed from other images/buffers, nothing
    /// of its own to render.
    Assembled,
}

/// `Image`: an ordered mip-element chain, each holding up to two
/// consecutive mip levels.
#[derive(Debug)]
pub struct Image {
    id: ImageId,
    kind: ImageKind,
    colorspace: Colorspace,
    mip_elements: Vec<ImageMipElement>,
    in_use: bool,
}

impl Image {
    pub(crate) fn new(
        id: ImageId,
        kind: ImageKind,
        colorspace: Colorspace,
        mip_elements: Vec<ImageMipElement>,
    ) -> Self {
        Self {
            id,
            kind,
            colorspace,
            mip_elements,
            in_use: false,
        }
    }

    pub const fn id(&self) -> ImageId {
        self.id
    }

    pub const fn kind(&self) -> ImageKind {
        self.kind
    }

    pub const fn is_rendered(&self) -> bool {
        matches!(self.kind, ImageKind::Rendered { .. })
    }

    pub const fn colorspace(&self) -> Colorspace {
        self.colorspace
    }

    pub fn mip_elements(&self) -> &[ImageMipElement] {
        &self.mip_elements
    }

    pub fn mip_elements_mut(&mut self) -> &mut [ImageMipElement] {
        &mut self.mip_elements
    }

    /// Total mip level count: every element contributes two except possibly
    /// the last, which may hold one.
    pub fn num_mip_levels(&self) -> u32 {
        self.mip_elements.iter().map(ImageMipElement::num_levels).sum()
    }

    /// Size of mip level 0, the image's nominal size.
    pub fn size(&self) -> (u32, u32) {
        self.mip_elements
            .first()
            .and_then(|element| element.level(0))
            .map(|level| level.size())
            .unwrap_or((0, 0))
    }

    pub const fn in_use(&self) -> bool {
        self.in_use
    }

    pub(crate) fn mark_in_use(&mut self) {
        self.in_use = true;
    }
}

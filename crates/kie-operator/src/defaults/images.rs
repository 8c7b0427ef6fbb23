use std::collections::BTreeMap;

use crate::{
    constants::{IMAGE_STREAM_NAMESPACE, RHEL_VERSION},
    context::ImageTemplate,
};

/// Prefix shared by every image override variable.
const IMAGE_VAR_PREFIX: &str = "RELATED_IMAGE_";

/// Image URLs replacing the defaults, keyed by `<IMAGE_VAR><version>` such as
/// `RELATED_IMAGE_KIESERVER_7.8.0`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ImageOverrides(BTreeMap<String, String>);

impl ImageOverrides {
    /// Collects the `RELATED_IMAGE_*` variables of the operator process.
    pub fn from_env() -> Self {
        std::env::vars()
            .filter(|(name, _)| name.starts_with(IMAGE_VAR_PREFIX))
            .collect()
    }

    pub fn with(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.0.insert(name.into(), url.into());
        self
    }

    pub fn get(&self, image_var: &str, version: &str) -> Option<&str> {
        self.0
            .get(&format!("{image_var}{version}"))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for ImageOverrides {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Splits an image URL into image name, tag and the repository context right before it.
///
/// `registry.redhat.io/rhpam-7/rhpam-kieserver-rhel8:7.8.0` yields
/// `("rhpam-kieserver-rhel8", "7.8.0", "rhpam-7")`.
pub fn parse_image(url: &str) -> (String, String, String) {
    let mut segments = url.rsplit('/');
    let image_and_tag = segments.next().unwrap_or_default();
    let context = segments.next().unwrap_or_default();
    let (image, tag) = match image_and_tag.rsplit_once(':') {
        Some((image, tag)) => (image, tag),
        None => (image_and_tag, ""),
    };
    (image.to_owned(), tag.to_owned(), context.to_owned())
}

/// The default `<product>-<component>-rhel8:<version>` image URL of a component.
pub fn default_image_url(product: &str, component: &str, version: &str) -> String {
    format!("{product}-{component}{RHEL_VERSION}:{version}")
}

/// Applies the override variables and the image settings of a resource to default image URLs.
pub struct ImageResolver<'a> {
    pub version: &'a str,
    pub use_image_tags: bool,
    pub overrides: &'a ImageOverrides,
}

impl ImageResolver<'_> {
    /// The URL configured through `image_var`, ignored when image tags are used.
    pub fn overridden(&self, image_var: &str) -> Option<&str> {
        if self.use_image_tags {
            return None;
        }
        self.overrides.get(image_var, self.version)
    }

    /// Resolves the image of a component. An override variable pulls the URL directly,
    /// an explicit image or tag tracks an image stream again.
    pub fn resolve(
        &self,
        default_url: String,
        image_var: &str,
        image: Option<&str>,
        image_tag: Option<&str>,
    ) -> ImageTemplate {
        let mut template = ImageTemplate {
            image_url: default_url,
            image_stream_namespace: IMAGE_STREAM_NAMESPACE.to_owned(),
            ..ImageTemplate::default()
        };
        if let Some(url) = self.overridden(image_var) {
            template.image_url = url.to_owned();
            template.omit_image_stream = true;
        }
        (template.image, template.image_tag, _) = parse_image(&template.image_url);

        if let Some(image) = image.filter(|image| !image.is_empty()) {
            template.image = image.to_owned();
            template.image_url = format!("{}:{}", template.image, template.image_tag);
            template.omit_image_stream = false;
        }
        if let Some(tag) = image_tag.filter(|tag| !tag.is_empty()) {
            template.image_tag = tag.to_owned();
            template.image_url = format!("{}:{}", template.image, template.image_tag);
            template.omit_image_stream = false;
        }
        template
    }
}

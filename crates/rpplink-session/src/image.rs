use bytes::Bytes;
use rpplink_marshal::CodeObject;
use tracing::{debug, warn};

use crate::error::Result;

/// Turns module source into the binary image a target loads.
///
/// Compiling Python source is outside this crate; implementations wrap
/// whatever tool chain produces the image.
pub trait ImageBuilder {
    fn build(&self, module_name: &str, source: &[u8]) -> Result<Bytes>;
}

/// Treats the "source" as an already compiled `.pmm` image.
///
/// The image must hold exactly one marshalled code object; it is sent
/// unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecompiledImage;

impl ImageBuilder for PrecompiledImage {
    fn build(&self, module_name: &str, source: &[u8]) -> Result<Bytes> {
        let code = CodeObject::from_image(source)?;
        let name = code.name_lossy();
        if name != module_name {
            warn!(module = module_name, image = %name, "image name differs from module name");
        }
        debug!(
            module = module_name,
            bytes = source.len(),
            consts = code.consts.len(),
            "validated precompiled image"
        );
        Ok(Bytes::copy_from_slice(source))
    }
}

impl<F> ImageBuilder for F
where
    F: Fn(&str, &[u8]) -> Result<Bytes>,
{
    fn build(&self, module_name: &str, source: &[u8]) -> Result<Bytes> {
        self(module_name, source)
    }
}

#[cfg(test)]
mod tests {
    use rpplink_marshal::{encode, Value};

    use super::*;
    use crate::error::SessionError;

    #[test]
    fn precompiled_image_passes_through() {
        let mut code = CodeObject::new("mod1", "mod1.py");
        code.consts.push(Value::None);
        let image = encode(&Value::from(code)).unwrap();

        let built = PrecompiledImage.build("mod1", &image).unwrap();
        assert_eq!(built, image);
    }

    #[test]
    fn precompiled_image_rejects_non_code() {
        let image = encode(&Value::Int(3)).unwrap();
        assert!(matches!(
            PrecompiledImage.build("mod1", &image),
            Err(SessionError::Marshal(_))
        ));
        assert!(matches!(
            PrecompiledImage.build("mod1", b"\x00\x01"),
            Err(SessionError::Marshal(_))
        ));
    }

    #[test]
    fn closures_are_builders() {
        let builder =
            |name: &str, _src: &[u8]| Ok::<_, SessionError>(Bytes::from(name.as_bytes().to_vec()));
        assert_eq!(builder.build("abc", b"").unwrap().as_ref(), b"abc");
    }
}

use anyhow::{Context, Result};
use std::marker::PhantomData;

/// One stage of image preparation, turning an `I` into an `O`.
///
/// Decoding, colour conversion, augmentation pipelines and tensor
/// conversion all implement it, so a dataset can hold any of them behind
/// `Arc<dyn Transform<..>>`. Stages compose with `.then(...)`, e.g.
/// `Pipeline::valid(512)?.then(ToChannelFirst)`.
///
/// `then()` needs the output of `self` to be the input of `next`, a sized
/// receiver, and `Send` intermediate values, since loader workers move
/// them across threads.
pub trait Transform<I, O>: Send + Sync {
    /// Applies the transformation to the input
    fn apply(&self, input: I) -> Result<O>;

    #[inline]
    fn then<T, M>(self, next: T) -> Chain<Self, T, O>
    where
        Self: Sized,
        T: Transform<O, M>,
        O: Send,
        M: Send,
    {
        Chain {
            first: self,
            second: next,
            _marker: PhantomData,
        }
    }
}

/// `A` followed by `B`; `M` is the value handed between them.
#[derive(Debug)]
pub struct Chain<A, B, M> {
    first: A,
    second: B,
    _marker: PhantomData<fn() -> M>,
}

impl<A, B, M> Chain<A, B, M> {
    /// Same as `first.then(second)`.
    pub fn new(first: A, second: B) -> Self {
        Self {
            first,
            second,
            _marker: PhantomData,
        }
    }
}

impl<I, M, O, A, B> Transform<I, O> for Chain<A, B, M>
where
    A: Transform<I, M>,
    B: Transform<M, O>,
    M: Send,
{
    fn apply(&self, input: I) -> Result<O> {
        self.first
            .apply(input)
            .and_then(|mid| self.second.apply(mid))
            .with_context(|| {
                format!(
                    "Transform chain failed: {} → {} → {}",
                    std::any::type_name::<A>(),
                    std::any::type_name::<B>(),
                    std::any::type_name::<O>()
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::vision::{EnsureRgb, Resize};
    use anyhow::anyhow;
    use image::{DynamicImage, RgbImage};

    struct Area;
    impl Transform<RgbImage, u32> for Area {
        fn apply(&self, input: RgbImage) -> Result<u32> {
            Ok(input.width() * input.height())
        }
    }

    #[test]
    fn test_pipeline_construction_using_then() -> Result<()> {
        let pipeline = EnsureRgb.then(Resize::new(4, 3)?).then(Area);
        let img = DynamicImage::new_luma8(10, 10);
        assert_eq!(pipeline.apply(img)?, 12);
        Ok(())
    }

    #[test]
    fn test_pipeline_construction_using_chain() -> Result<()> {
        let chain = Chain::new(Resize::new(2, 5)?, Area);
        assert_eq!(chain.apply(RgbImage::new(7, 7))?, 10);
        Ok(())
    }

    #[test]
    fn test_pipeline_chain_error_context() {
        struct Fail;
        impl Transform<RgbImage, RgbImage> for Fail {
            fn apply(&self, _: RgbImage) -> Result<RgbImage> {
                Err(anyhow!("Test error"))
            }
        }

        let chain = Chain::new(Fail, Area);
        let err = chain.apply(RgbImage::new(1, 1)).unwrap_err();
        let msg = err.to_string();

        assert!(msg.contains("Transform chain failed"));
        assert!(msg.contains("Fail"));
        assert!(msg.contains("Area"));
    }
}

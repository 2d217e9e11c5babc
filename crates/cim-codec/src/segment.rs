use crate::class::ConstClass;
use crate::error::{CodecError, CodecResult};
use crate::instance::InstanceView;

/// What a [`MsgSegment`] carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    ConstClass,
    Instance,
}

/// An encoded object ready to be handed to a transport.
///
/// The receiving side turns the bytes back into a view with a relocation,
/// never a full decode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MsgSegment {
    pub kind: SegmentKind,
    pub data: Vec<u8>,
}

impl MsgSegment {
    pub fn from_class(class: &ConstClass) -> Self {
        Self {
            kind: SegmentKind::ConstClass,
            data: class.as_bytes().to_vec(),
        }
    }

    pub fn from_instance(instance: &InstanceView) -> Self {
        Self {
            kind: SegmentKind::Instance,
            data: instance.as_bytes().to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_class(self) -> CodecResult<ConstClass> {
        match self.kind {
            SegmentKind::ConstClass => ConstClass::relocate(self.data),
            SegmentKind::Instance => Err(CodecError::UnexpectedRecord {
                expected: crate::layout::RecordKind::Class,
                found: crate::layout::RecordKind::Instance,
            }),
        }
    }

    pub fn into_instance(self) -> CodecResult<InstanceView> {
        match self.kind {
            SegmentKind::Instance => InstanceView::relocate(self.data),
            SegmentKind::ConstClass => Err(CodecError::UnexpectedRecord {
                expected: crate::layout::RecordKind::Instance,
                found: crate::layout::RecordKind::Class,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ClassDescriptor, InstanceDescriptor, PropertyDecl};
    use cim_types::CimType;

    #[test]
    fn class_segment_relocates() {
        let class = ConstClass::from_descriptor(
            &ClassDescriptor::new("A").with_property(PropertyDecl::new("P", CimType::Uint8)),
        )
        .unwrap();
        let segment = MsgSegment::from_class(&class);
        assert_eq!(segment.len(), class.serialized_size());
        let back = segment.into_class().unwrap();
        assert_eq!(back, class);
    }

    #[test]
    fn kind_mismatch_rejected() {
        let inst = InstanceView::from_descriptor(&InstanceDescriptor::new(None, "A")).unwrap();
        let segment = MsgSegment::from_instance(&inst);
        assert!(segment.clone().into_class().is_err());
        assert_eq!(segment.into_instance().unwrap().class_name(), "A");
    }
}

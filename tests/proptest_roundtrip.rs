use proptest::prelude::*;
use uuid::Uuid;

use hidblock::descriptor::{
    self, DataFormatFlags, DeviceReportDescriptor, ObjectFormatEntry, ObjectOptions, ObjectType,
};
use hidblock::effect::{
    self, Condition, ConstantForce, CustomForce, EffectEnvelope, EffectFlags, EffectKind,
    EffectParameterBlock, Periodic, RampForce, TypeSpecific,
};

const REPORT_SIZE: u32 = 4096;

// ── Strategies ───────────────────────────────────────────────────────────────

/// Tags never carry bits 8–23; those belong to the instance index.
fn object_type() -> impl Strategy<Value = ObjectType> {
    let low = prop::sample::select(vec![0x01u32, 0x02, 0x03, 0x04, 0x08, 0x0C, 0x10, 0x40, 0x80]);
    (low, any::<u8>()).prop_map(|(low, high)| ObjectType::from_bits_retain(low | (high as u32) << 24))
}

fn entry() -> impl Strategy<Value = ObjectFormatEntry> {
    (
        prop::option::of(any::<u128>().prop_map(Uuid::from_u128)),
        0u32..=REPORT_SIZE - 4,
        object_type(),
        any::<i16>(),
        any::<u32>(),
    )
        .prop_map(|(guid, offset, object_type, instance, options)| {
            ObjectFormatEntry::new(guid, offset, object_type)
                .with_instance(instance)
                .with_options(ObjectOptions::from_bits_retain(options))
        })
}

fn envelope() -> impl Strategy<Value = EffectEnvelope> {
    (any::<i32>(), any::<u32>(), any::<i32>(), any::<u32>()).prop_map(|(a, b, c, d)| EffectEnvelope {
        attack_level: a,
        attack_time:  b,
        fade_level:   c,
        fade_time:    d,
    })
}

fn condition() -> impl Strategy<Value = Condition> {
    (any::<[i32; 4]>(), any::<[u32; 2]>()).prop_map(|(i, u)| Condition {
        offset:               i[0],
        positive_coefficient: i[1],
        negative_coefficient: i[2],
        positive_saturation:  u[0],
        negative_saturation:  u[1],
        dead_band:            i[3],
    })
}

fn payload(kind: EffectKind, axes: usize) -> BoxedStrategy<TypeSpecific> {
    match kind {
        EffectKind::ConstantForce => any::<i32>()
            .prop_map(|magnitude| TypeSpecific::ConstantForce(ConstantForce { magnitude }))
            .boxed(),
        EffectKind::RampForce => (any::<i32>(), any::<i32>())
            .prop_map(|(start, end)| TypeSpecific::RampForce(RampForce { start, end }))
            .boxed(),
        EffectKind::Periodic => (any::<u32>(), any::<i32>(), any::<u32>(), any::<u32>())
            .prop_map(|(magnitude, offset, phase, period)| {
                TypeSpecific::Periodic(Periodic { magnitude, offset, phase, period })
            })
            .boxed(),
        EffectKind::Condition => prop::collection::vec(condition(), axes)
            .prop_map(TypeSpecific::Condition)
            .boxed(),
        EffectKind::CustomForce => (any::<u32>(), any::<u32>(), prop::collection::vec(any::<i32>(), 0..64))
            .prop_map(|(channels, sample_period, samples)| {
                TypeSpecific::CustomForce(CustomForce { channels, sample_period, samples })
            })
            .boxed(),
    }
}

fn params(kind: EffectKind) -> impl Strategy<Value = EffectParameterBlock> {
    (0..8usize)
        .prop_flat_map(move |n| {
            (
                prop::collection::vec(any::<u32>(), n),
                prop::collection::vec(any::<i32>(), n),
                prop::option::of(envelope()),
                payload(kind, n),
                any::<[u32; 7]>(),
            )
        })
        .prop_map(|(axes, direction, envelope, payload, s)| EffectParameterBlock {
            flags:                   EffectFlags::from_bits_retain(s[0]),
            duration:                s[1],
            sample_period:           s[2],
            gain:                    s[3],
            trigger_button:          s[4],
            trigger_repeat_interval: s[5],
            axes,
            direction,
            envelope,
            type_specific:           Some(payload),
            start_delay:             s[6],
        })
}

fn effect_roundtrip(p: &EffectParameterBlock, kind: EffectKind) -> Result<(), TestCaseError> {
    let block = effect::encode(p, None).map_err(|e| TestCaseError::fail(e.to_string()))?;
    let decoded = effect::decode(&block.view(), kind).map_err(|e| TestCaseError::fail(e.to_string()))?;
    // A condition list with no axes has no records and comes back as no payload.
    let mut expected = p.clone();
    if matches!(&expected.type_specific, Some(TypeSpecific::Condition(c)) if c.is_empty()) {
        expected.type_specific = None;
    }
    prop_assert_eq!(decoded, expected);
    Ok(())
}

// ── Properties ───────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn prop_descriptor_roundtrip(
        flags in prop_oneof![Just(DataFormatFlags::ABSOLUTE_AXIS), Just(DataFormatFlags::RELATIVE_AXIS)],
        objects in prop::collection::vec(entry(), 0..=256),
    ) {
        let desc = DeviceReportDescriptor::new(flags, REPORT_SIZE, objects).unwrap();
        let block = descriptor::encode(&desc).unwrap();
        let decoded = descriptor::decode(&block.view()).unwrap();
        prop_assert_eq!(decoded, desc);
    }

    #[test]
    fn prop_type_word_roundtrip(tag in object_type(), instance in any::<i16>()) {
        let word = descriptor::pack_type_word(tag, instance);
        prop_assert_eq!(descriptor::unpack_type_word(word), (tag, instance));
    }

    #[test]
    fn prop_constant_roundtrip(p in params(EffectKind::ConstantForce)) {
        effect_roundtrip(&p, EffectKind::ConstantForce)?;
    }

    #[test]
    fn prop_ramp_roundtrip(p in params(EffectKind::RampForce)) {
        effect_roundtrip(&p, EffectKind::RampForce)?;
    }

    #[test]
    fn prop_periodic_roundtrip(p in params(EffectKind::Periodic)) {
        effect_roundtrip(&p, EffectKind::Periodic)?;
    }

    #[test]
    fn prop_condition_roundtrip(p in params(EffectKind::Condition)) {
        effect_roundtrip(&p, EffectKind::Condition)?;
    }

    #[test]
    fn prop_custom_roundtrip(p in params(EffectKind::CustomForce)) {
        effect_roundtrip(&p, EffectKind::CustomForce)?;
    }
}

use crate::codec::{self, Decode, Encode};

/// Wire discriminator identifying a message's concrete kind.
pub type Tag = u8;

pub const TAG_TRANSFORM_UPDATE: Tag = 0;
pub const TAG_SET_ACTIVE: Tag = 1;

/// Position, rotation (euler angles in degrees) and scale of a named
/// scene object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
  pub position: [f32; 3],
  pub rotation: [f32; 3],
  pub scale: [f32; 3],
}

impl Default for Transform {
  fn default() -> Self {
    Self {
      position: [0.0; 3],
      rotation: [0.0; 3],
      scale: [1.0; 3],
    }
  }
}

impl Encode for Transform {
  fn encode<B: bytes::BufMut>(&self, buf: &mut B) {
    for component in self
      .position
      .iter()
      .chain(self.rotation.iter())
      .chain(self.scale.iter())
    {
      component.encode(buf);
    }
  }
}

impl Decode for Transform {
  fn decode<B: bytes::Buf>(buf: &mut B) -> codec::Result<Self> {
    let mut components = [0f32; 9];
    for component in components.iter_mut() {
      *component = f32::decode(buf)?;
    }
    Ok(Self {
      position: [components[0], components[1], components[2]],
      rotation: [components[3], components[4], components[5]],
      scale: [components[6], components[7], components[8]],
    })
  }
}

/// The state an application exposes to incoming messages.
///
/// Targets are addressed by name; a lookup miss is a recoverable `false`,
/// not an error. The transport never sees the concrete scene objects
/// behind this interface.
pub trait EffectTarget {
  /// Apply a transform to the object called `name`.
  /// Returns whether the object was found.
  fn set_transform(&mut self, name: &str, transform: &Transform) -> bool;
  /// Set the active flag of the object called `name`.
  /// Returns whether the object was found.
  fn set_active(&mut self, name: &str, active: bool) -> bool;
}

/// A typed application message.
///
/// Messages are value types: constructed from live state on the sending
/// side, encoded once at send time, decoded once at receive time, and
/// discarded after `apply` returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
  /// Replace the transform of the object called `name`.
  TransformUpdate { name: String, transform: Transform },
  /// Toggle the active flag of the object called `name`.
  SetActive { name: String, active: bool },
}

impl Message {
  pub fn tag(&self) -> Tag {
    match self {
      Message::TransformUpdate { .. } => TAG_TRANSFORM_UPDATE,
      Message::SetActive { .. } => TAG_SET_ACTIVE,
    }
  }

  /// Returns the byte representation of the message: its tag followed
  /// by the fields in declared order.
  pub fn to_bytes(&self) -> Vec<u8> {
    let mut buf = Vec::new();
    self.encode(&mut buf);
    buf
  }

  /// Execute the message's effect against `target`.
  /// Returns whether the named object was found.
  pub fn apply<T: EffectTarget>(&self, target: &mut T) -> bool {
    match self {
      Message::TransformUpdate { name, transform } => target.set_transform(name, transform),
      Message::SetActive { name, active } => target.set_active(name, *active),
    }
  }
}

impl Encode for Message {
  fn encode<B: bytes::BufMut>(&self, buf: &mut B) {
    self.tag().encode(buf);
    match self {
      Message::TransformUpdate { name, transform } => {
        name.encode(buf);
        transform.encode(buf);
      }
      Message::SetActive { name, active } => {
        name.encode(buf);
        active.encode(buf);
      }
    }
  }
}

type DecodeFn = fn(&mut &[u8]) -> codec::Result<Message>;

fn decode_transform_update(buf: &mut &[u8]) -> codec::Result<Message> {
  let name = String::decode(buf)?;
  let transform = Transform::decode(buf)?;
  Ok(Message::TransformUpdate { name, transform })
}

fn decode_set_active(buf: &mut &[u8]) -> codec::Result<Message> {
  let name = String::decode(buf)?;
  let active = bool::decode(buf)?;
  Ok(Message::SetActive { name, active })
}

/// Maps message tags to their decoders.
///
/// Built once at session construction and immutable afterwards; there is
/// no runtime re-registration.
pub struct Registry {
  decoders: Vec<Option<DecodeFn>>,
}

impl Registry {
  /// An empty registry. Use [`Registry::standard`] unless you are
  /// restricting the accepted message set.
  pub fn new() -> Self {
    let mut decoders = Vec::new();
    decoders.resize_with(u8::MAX as usize + 1, || None);
    Self { decoders }
  }

  /// A registry accepting every built-in message kind.
  pub fn standard() -> Self {
    let mut registry = Self::new();
    registry.register(TAG_TRANSFORM_UPDATE, decode_transform_update);
    registry.register(TAG_SET_ACTIVE, decode_set_active);
    registry
  }

  /// Associate `tag` with `decoder`.
  ///
  /// ### Panics
  ///
  /// If `tag` is already registered.
  pub fn register(&mut self, tag: Tag, decoder: DecodeFn) {
    assert!(
      self.decoders[tag as usize].is_none(),
      "message tag {tag} is already registered"
    );
    self.decoders[tag as usize] = Some(decoder);
  }

  /// Decode a message envelope: tag byte, then the registered layout.
  pub fn decode(&self, bytes: &[u8]) -> codec::Result<Message> {
    let mut buf = bytes;
    let tag = u8::decode(&mut buf)?;
    match self.decoders[tag as usize] {
      Some(decoder) => decoder(&mut buf),
      None => Err(codec::Error::UnknownTag(tag)),
    }
  }

  /// Decode `bytes` and execute the message's effect against `target`.
  ///
  /// Returns the effect's success flag, or the decode error for a
  /// malformed envelope. Never executes an effect for a frame that did
  /// not decode in full.
  pub fn dispatch<T: EffectTarget>(&self, bytes: &[u8], target: &mut T) -> codec::Result<bool> {
    let message = self.decode(bytes)?;
    Ok(message.apply(target))
  }
}

impl Default for Registry {
  fn default() -> Self {
    Self::standard()
  }
}


#[cfg(test)]
mod tests {
  use {super::testing::Scene, super::*, pretty_assertions::assert_eq};

  fn transform_update() -> Message {
    Message::TransformUpdate {
      name: "player".into(),
      transform: Transform {
        position: [1.0, 2.5, -3.0],
        rotation: [0.0, 90.0, 180.0],
        scale: [1.0, 1.0, 0.5],
      },
    }
  }

  #[test]
  fn round_trip_transform_update() {
    let registry = Registry::standard();
    let message = transform_update();
    assert_eq!(registry.decode(&message.to_bytes()).unwrap(), message);
  }

  #[test]
  fn round_trip_set_active() {
    let registry = Registry::standard();
    for active in [true, false] {
      let message = Message::SetActive { name: "cube".into(), active };
      assert_eq!(registry.decode(&message.to_bytes()).unwrap(), message);
    }
  }

  #[test]
  fn transform_update_layout() {
    // tag + name prefix + name + 9 floats
    let message = transform_update();
    assert_eq!(message.to_bytes().len(), 1 + 1 + 6 + 9 * 4);
  }

  #[test]
  fn decode_unknown_tag() {
    let registry = Registry::standard();
    assert_eq!(
      registry.decode(&[200, 0, 0]),
      Err(codec::Error::UnknownTag(200))
    );
  }

  #[test]
  fn decode_truncated_envelope() {
    let registry = Registry::standard();
    let bytes = transform_update().to_bytes();
    assert_eq!(
      registry.decode(&bytes[..bytes.len() - 1]),
      Err(codec::Error::UnexpectedEof)
    );
  }

  #[test]
  fn decode_empty_envelope() {
    let registry = Registry::standard();
    assert_eq!(registry.decode(&[]), Err(codec::Error::UnexpectedEof));
  }

  #[test]
  fn dispatch_applies_effect() {
    let registry = Registry::standard();
    let mut scene = Scene::with_object("player");
    let message = transform_update();
    assert_eq!(registry.dispatch(&message.to_bytes(), &mut scene), Ok(true));
    let (transform, _) = &scene.objects["player"];
    assert_eq!(transform.position, [1.0, 2.5, -3.0]);
  }

  #[test]
  fn dispatch_missing_target_is_not_an_error() {
    let registry = Registry::standard();
    let mut scene = Scene::default();
    let message = Message::SetActive { name: "ghost".into(), active: false };
    assert_eq!(
      registry.dispatch(&message.to_bytes(), &mut scene),
      Ok(false)
    );
  }

  #[test]
  #[should_panic(expected = "already registered")]
  fn duplicate_registration_panics() {
    let mut registry = Registry::standard();
    registry.register(TAG_SET_ACTIVE, decode_set_active);
  }
}

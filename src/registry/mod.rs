//! Реестр типов сообщений.
//!
//! Связывает Rust-тип записи со стабильным строковым wire-именем и обратно.
//! Каждый тип отображается ровно в одно имя, каждое имя разрешается не
//! более чем в один тип. Регистрация идемпотентна.

use std::{
    any::{type_name, TypeId},
    sync::Arc,
};

use dashmap::{mapref::entry::Entry, DashMap};
use once_cell::sync::Lazy;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;
use zumbus_error::{RegistryError, ZumbusResult};

/// Запись, которую можно передавать по шине.
///
/// Wire-имя является частью протокола: все процессы, обменивающиеся типом,
/// должны объявлять одинаковое имя.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct ChatMessage { room: String, text: String }
///
/// impl MessageType for ChatMessage {
///     const WIRE_NAME: &'static str = "chat-message";
/// }
/// ```
pub trait MessageType: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Стабильное wire-имя типа.
    const WIRE_NAME: &'static str;
}

/// Результат разрешения wire-имени.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredType {
    pub type_id: TypeId,
    pub wire_name: Arc<str>,
    /// Полное Rust-имя типа (для логов и диагностики).
    pub rust_name: &'static str,
}

/// Потокобезопасный двунаправленный реестр `TypeId <-> wire-имя`.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_type: DashMap<TypeId, RegisteredType>,
    by_name: DashMap<Arc<str>, RegisteredType>,
}

static GLOBAL: Lazy<Arc<TypeRegistry>> = Lazy::new(|| Arc::new(TypeRegistry::new()));

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Общий для процесса реестр.
    ///
    /// Для изолированных сценариев (тесты, несколько шин в одном процессе)
    /// создавайте собственный экземпляр через [`TypeRegistry::new`].
    pub fn global() -> Arc<TypeRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Регистрирует тип `T` под его [`MessageType::WIRE_NAME`].
    ///
    /// Повторная регистрация того же типа ничего не меняет. Имя, уже занятое
    /// другим типом, отклоняется с [`RegistryError::NameConflict`].
    pub fn register<T: MessageType>(&self) -> ZumbusResult<Arc<str>> {
        self.register_raw(TypeId::of::<T>(), type_name::<T>(), T::WIRE_NAME)
    }

    /// Нетипизированная регистрация: используется, когда `TypeId` и имя уже
    /// известны.
    pub fn register_raw(
        &self,
        type_id: TypeId,
        rust_name: &'static str,
        wire_name: &str,
    ) -> ZumbusResult<Arc<str>> {
        if let Some(existing) = self.by_type.get(&type_id) {
            return Ok(Arc::clone(&existing.wire_name));
        }

        validate_wire_name(rust_name, wire_name)?;

        let name: Arc<str> = Arc::from(wire_name);
        let entry = RegisteredType {
            type_id,
            wire_name: Arc::clone(&name),
            rust_name,
        };

        match self.by_name.entry(Arc::clone(&name)) {
            Entry::Occupied(occupied) => {
                let bound = occupied.get();
                if bound.type_id != type_id {
                    return Err(RegistryError::NameConflict {
                        wire_name: wire_name.to_string(),
                        registered: bound.rust_name.to_string(),
                        requested: rust_name.to_string(),
                    }
                    .into());
                }
                // Параллельная регистрация того же типа уже завершилась.
                Ok(Arc::clone(&bound.wire_name))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry.clone());
                self.by_type.insert(type_id, entry);
                debug!(wire_name = %name, rust_name, "Registered message type");
                Ok(name)
            }
        }
    }

    /// Wire-имя зарегистрированного типа.
    pub fn name_of<T: MessageType>(&self) -> ZumbusResult<Arc<str>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .map(|e| Arc::clone(&e.wire_name))
            .ok_or_else(|| {
                RegistryError::NotRegistered {
                    type_name: type_name::<T>().to_string(),
                }
                .into()
            })
    }

    /// Wire-имя по `TypeId`.
    pub fn name_of_id(
        &self,
        type_id: TypeId,
    ) -> ZumbusResult<Arc<str>> {
        self.by_type
            .get(&type_id)
            .map(|e| Arc::clone(&e.wire_name))
            .ok_or_else(|| {
                RegistryError::NotRegistered {
                    type_name: format!("{type_id:?}"),
                }
                .into()
            })
    }

    /// Разрешает wire-имя. Неизвестное имя не является ошибкой.
    pub fn resolve(
        &self,
        wire_name: &str,
    ) -> Option<RegisteredType> {
        self.by_name.get(wire_name).map(|e| e.value().clone())
    }

    pub fn is_registered<T: MessageType>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Все зарегистрированные имена в отсортированном виде.
    pub fn names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = self.by_name.iter().map(|e| Arc::clone(e.key())).collect();
        names.sort();
        names
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние методы и функции
////////////////////////////////////////////////////////////////////////////////

/// Имя считается отсутствующим, если оно пустое, состоит только из пробелов
/// или содержит управляющие символы.
fn validate_wire_name(
    rust_name: &str,
    wire_name: &str,
) -> Result<(), RegistryError> {
    if wire_name.trim().is_empty() || wire_name.chars().any(char::is_control) {
        return Err(RegistryError::MissingWireName {
            type_name: rust_name.to_string(),
        });
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

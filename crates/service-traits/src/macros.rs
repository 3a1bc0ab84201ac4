/// Generate the intercepting decorator for a capability trait.
///
/// The trait must be `Send + Sync`, declared with `#[async_trait]`, and every
/// method must return a [`ServiceResult`](crate::ServiceResult). Arguments
/// must implement `serde::Serialize`; they are recorded by name in the
/// [`Invocation`](crate::Invocation) that checks see.
///
/// ```ignore
/// #[async_trait]
/// pub trait UserService: Send + Sync {
///     async fn find(&self, id: String) -> ServiceResult<Value>;
/// }
///
/// intercepted_service! {
///     pub struct InterceptedUserService for UserService as "users" {
///         async fn find(&self, id: String) -> ServiceResult<Value>;
///     }
/// }
/// ```
///
/// This defines `InterceptedUserService`, implements `UserService` for it by
/// forwarding through an [`Interceptor`](crate::Interceptor), and implements
/// [`Capability`](crate::Capability) for `dyn UserService`.
#[macro_export]
macro_rules! intercepted_service {
    (
        $(#[$meta:meta])*
        $vis:vis struct $wrapper:ident for $capability:ident as $name:literal {
            $(
                async fn $method:ident(&self $(, $arg:ident : $arg_ty:ty)* $(,)?) -> $ret:ty;
            )*
        }
    ) => {
        $(#[$meta])*
        $vis struct $wrapper {
            inner: ::std::sync::Arc<dyn $capability>,
            interceptor: $crate::Interceptor,
            context: $crate::CallContext,
        }

        impl $wrapper {
            /// The call context bound into this dispatch target.
            #[allow(dead_code)]
            pub fn context(&self) -> &$crate::CallContext {
                &self.context
            }
        }

        #[$crate::__private::async_trait]
        impl $capability for $wrapper {
            $(
                async fn $method(&self $(, $arg: $arg_ty)*) -> $ret {
                    #[allow(unused_mut)]
                    let mut args = $crate::__private::serde_json::Map::new();
                    $(
                        args.insert(
                            ::std::string::String::from(stringify!($arg)),
                            $crate::arg_value(&$arg),
                        );
                    )*
                    self.interceptor
                        .invoke(
                            &self.context,
                            stringify!($method),
                            $crate::__private::serde_json::Value::Object(args),
                            move || self.inner.$method($($arg),*),
                        )
                        .await
                }
            )*
        }

        impl $crate::Capability for dyn $capability {
            const NAME: &'static str = $name;
            const OPERATIONS: &'static [&'static str] = &[$(stringify!($method)),*];

            fn intercept(
                inner: ::std::sync::Arc<Self>,
                interceptor: $crate::Interceptor,
                context: $crate::CallContext,
            ) -> ::std::sync::Arc<Self> {
                ::std::sync::Arc::new($wrapper {
                    inner,
                    interceptor,
                    context,
                })
            }
        }
    };
}
